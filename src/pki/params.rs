//! Request parameters for certificate issuance.
//!
//! Vault's issue endpoints take flat string fields, so query multimaps are
//! collapsed to comma-joined strings, and the reserved `pod_*` parameters
//! are replaced by real fields derived from the pod's identity.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::errors::{FetchError, Result};
use crate::pod::PodIdentity;

pub const POD_IP_AS_SAN: &str = "pod_ip_as_san";
pub const POD_HOSTNAME_AS_CN: &str = "pod_hostname_as_cn";
pub const POD_HOSTNAME_AS_SAN: &str = "pod_hostname_as_san";

/// Build the issuance request body for certificate `name`.
///
/// Values of one key are split on `,`, stripped of empty entries and joined
/// back with `,`; keys left with nothing are dropped. Entries are otherwise
/// passed through untouched. Pod-derived values are
/// prepended to whatever the request declared.
pub fn build_request_body(
    name: &str,
    parameters: &BTreeMap<String, Vec<String>>,
    pod: &PodIdentity,
) -> Result<Map<String, Value>> {
    let mut fields: BTreeMap<String, String> = parameters
        .iter()
        .filter_map(|(key, values)| {
            let joined = values
                .iter()
                .flat_map(|v| v.split(','))
                .filter(|v| !v.is_empty())
                .collect::<Vec<_>>()
                .join(",");
            (!joined.is_empty()).then(|| (key.clone(), joined))
        })
        .collect();

    if take_flag(&mut fields, POD_IP_AS_SAN) {
        let ip = pod.ip.ok_or_else(|| {
            FetchError::config(format!(
                "{} requested {}=true but the pod IPv4 address is unknown",
                name, POD_IP_AS_SAN
            ))
        })?;
        prepend(&mut fields, "ip_sans", &ip.to_string());
    }

    if take_flag(&mut fields, POD_HOSTNAME_AS_CN) {
        fields.insert("common_name".to_string(), pod.hostname.clone());
    }

    if take_flag(&mut fields, POD_HOSTNAME_AS_SAN) {
        prepend(&mut fields, "alt_names", &pod.hostname);
    }

    Ok(fields.into_iter().map(|(k, v)| (k, Value::String(v))).collect())
}

// Reserved parameters are always consumed, whatever their value.
fn take_flag(fields: &mut BTreeMap<String, String>, key: &str) -> bool {
    fields.remove(key).is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

fn prepend(fields: &mut BTreeMap<String, String>, key: &str, value: &str) {
    let combined = match fields.get(key) {
        Some(existing) => format!("{},{}", value, existing),
        None => value.to_string(),
    };
    fields.insert(key.to_string(), combined);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CertificateRequest;
    use serde_json::json;
    use std::net::Ipv4Addr;

    fn pod() -> PodIdentity {
        PodIdentity::new(Some(Ipv4Addr::LOCALHOST), "web-7d9f")
    }

    fn body(uri: &str) -> Result<Value> {
        let request = CertificateRequest::parse("web", uri);
        build_request_body(&request.name, &request.parameters, &pod()).map(Value::Object)
    }

    #[test]
    fn test_pod_ip_is_prepended_to_ip_sans() {
        let body = body("pki/issue/web?ip_sans=10.0.0.1&ip_sans=10.0.0.2&pod_ip_as_san=true").unwrap();
        assert_eq!(body, json!({ "ip_sans": "127.0.0.1,10.0.0.1,10.0.0.2" }));
    }

    #[test]
    fn test_comma_separated_and_repeated_keys_are_equivalent() {
        assert_eq!(
            body("pki/issue/web?alt_names=a.example.com,b.example.com").unwrap(),
            body("pki/issue/web?alt_names=a.example.com&alt_names=b.example.com").unwrap()
        );
    }

    #[test]
    fn test_empty_values_are_dropped() {
        let body = body("pki/issue/web?common_name=web.example.com&ip_sans=&alt_names=,&ttl=").unwrap();
        assert_eq!(body, json!({ "common_name": "web.example.com" }));
    }

    #[test]
    fn test_empty_entries_inside_list_are_dropped() {
        let body = body("pki/issue/web?alt_names=a&alt_names=&alt_names=b").unwrap();
        assert_eq!(body, json!({ "alt_names": "a,b" }));
    }

    #[test]
    fn test_entries_keep_their_spacing() {
        let body = body("pki/issue/web?common_name=a,+b&alt_names=+padded+").unwrap();
        assert_eq!(body, json!({ "common_name": "a, b", "alt_names": " padded " }));
    }

    #[test]
    fn test_hostname_as_cn_overwrites() {
        let body = body("pki/issue/web?common_name=declared&pod_hostname_as_cn=TRUE").unwrap();
        assert_eq!(body, json!({ "common_name": "web-7d9f" }));
    }

    #[test]
    fn test_hostname_as_san_prepends() {
        let body = body("pki/issue/web?alt_names=web.example.com&pod_hostname_as_san=true").unwrap();
        assert_eq!(body, json!({ "alt_names": "web-7d9f,web.example.com" }));

        let body = self::body("pki/issue/web?pod_hostname_as_san=true").unwrap();
        assert_eq!(body, json!({ "alt_names": "web-7d9f" }));
    }

    #[test]
    fn test_reserved_parameters_are_additive() {
        let body =
            body("pki/issue/web?pod_ip_as_san=true&pod_hostname_as_cn=true&pod_hostname_as_san=true").unwrap();
        assert_eq!(
            body,
            json!({ "ip_sans": "127.0.0.1", "common_name": "web-7d9f", "alt_names": "web-7d9f" })
        );
    }

    #[test]
    fn test_reserved_parameters_are_consumed_when_false() {
        let body = body("pki/issue/web?common_name=x&pod_ip_as_san=false&pod_hostname_as_cn=no").unwrap();
        assert_eq!(body, json!({ "common_name": "x" }));
    }

    #[test]
    fn test_missing_pod_ip_fails_only_when_requested() {
        let request = CertificateRequest::parse("web", "pki/issue/web?pod_ip_as_san=true");
        let no_ip = PodIdentity::new(None, "web-7d9f");

        let err = build_request_body(&request.name, &request.parameters, &no_ip).unwrap_err();
        assert!(matches!(err, FetchError::Config { .. }));

        let request = CertificateRequest::parse("web", "pki/issue/web?common_name=x");
        assert!(build_request_body(&request.name, &request.parameters, &no_ip).is_ok());
    }
}
