const SCHEMES: [&str; 2] = ["https://", "http://"];

/// Turns a host, IP address or URL into an absolute base URL: `https://` is assumed when no
/// scheme is given and trailing slashes are dropped. The host itself is not validated.
pub fn normalize_url(input: &str) -> String {
    let scheme = SCHEMES
        .iter()
        .find(|scheme| input.get(..scheme.len()).is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme)));

    let (scheme, rest) = match scheme {
        Some(scheme) => input.split_at(scheme.len()),
        None => ("https://", input),
    };

    format!("{}{}", scheme, rest.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("pikvm.local", "https://pikvm.local")]
    #[case("10.0.0.5", "https://10.0.0.5")]
    #[case("10.0.0.5/", "https://10.0.0.5")]
    #[case("https://pikvm.local", "https://pikvm.local")]
    #[case("https://pikvm.local/", "https://pikvm.local")]
    #[case("http://pikvm.local", "http://pikvm.local")]
    #[case("HTTPS://pikvm.local", "HTTPS://pikvm.local")]
    #[case("pikvm.local:8443/kvm/", "https://pikvm.local:8443/kvm")]
    #[case("httpbin.local", "https://httpbin.local")]
    fn normalize_url_adds_a_scheme_and_strips_slashes(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize_url(input), expected);
    }

    #[rstest]
    #[case("")]
    #[case("/")]
    #[case("https://")]
    #[case("pikvm.local//")]
    #[case("http:/pikvm.local")]
    #[case("ünïcødé/")]
    #[case("https://[fe80::1]/")]
    fn normalize_url_is_idempotent(#[case] input: &str) {
        let once = normalize_url(input);

        assert_eq!(normalize_url(&once), once);
    }
}
