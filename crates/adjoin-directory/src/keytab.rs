//! Parsing of tool listings into principal names.

/// Extract principals from `klist -k` output.
///
/// ```text
/// Keytab name: FILE:/etc/krb5.keytab
/// KVNO Principal
/// ---- --------------------------------------------------
///    2 host/files01.example.com@EXAMPLE.COM
/// ```
///
/// Entries repeat once per encryption type; duplicates are collapsed.
pub fn parse_keytab_listing(output: &str) -> Vec<String> {
    let mut principals: Vec<String> = Vec::new();
    for line in output.lines() {
        let mut fields = line.split_whitespace();
        let (Some(kvno), Some(principal)) = (fields.next(), fields.next()) else {
            continue;
        };
        if kvno.parse::<u32>().is_err() {
            continue;
        }
        if !principals.iter().any(|p| p == principal) {
            principals.push(principal.to_string());
        }
    }
    principals
}

/// Extract SPNs from `net ads setspn list` output.
///
/// The listing starts with the account DN followed by one indented SPN per
/// line; password prompts and the DN line are skipped.
pub fn parse_spn_listing(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.to_ascii_lowercase().starts_with("dn:"))
        .filter(|line| !line.contains(' ') && line.contains('/'))
        .map(str::to_string)
        .collect()
}
