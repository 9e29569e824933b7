//! RPC query strings
//!
//! RPC-style actions carry every parameter in the query string. The same
//! string is sent on the wire and used in the canonical request, so keys are
//! sorted and both keys and values are RFC 3986 encoded.

use std::collections::BTreeMap;

/// RFC 3986 percent-encoding (unreserved characters pass through)
pub fn url_encode(s: &str) -> String {
    urlencoding::encode(s).into_owned()
}

/// Sorted, encoded `key=value&...` string
pub fn canonical_query(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", url_encode(k), url_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreserved_pass_through() {
        assert_eq!(url_encode("AZaz09-_.~"), "AZaz09-_.~");
    }

    #[test]
    fn reserved_and_multibyte_are_encoded() {
        assert_eq!(url_encode("10.0.0.0/24,8.8.8.8"), "10.0.0.0%2F24%2C8.8.8.8");
        assert_eq!(url_encode("a b*"), "a%20b%2A");
        assert_eq!(url_encode("地址"), "%E5%9C%B0%E5%9D%80");
    }

    #[test]
    fn query_is_sorted() {
        let params = BTreeMap::from([
            ("PageSize".to_string(), "50".to_string()),
            ("CurrentPage".to_string(), "1".to_string()),
            ("GroupType".to_string(), "ip".to_string()),
        ]);
        assert_eq!(canonical_query(&params), "CurrentPage=1&GroupType=ip&PageSize=50");
    }

    #[test]
    fn empty_params_give_empty_query() {
        assert_eq!(canonical_query(&BTreeMap::new()), "");
    }
}
