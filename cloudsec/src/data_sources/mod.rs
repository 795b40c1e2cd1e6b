pub mod asset_group;
pub mod cloud_account;

pub use asset_group::AssetGroupDataSource;
pub use cloud_account::CloudAccountDataSource;

use tfplug::Diagnostic;

/// Pick the one object a lookup is expected to find.
///
/// No match is an error. Several matches produce a warning and the first
/// one is used.
pub(crate) fn select_single<T>(
    mut matches: Vec<T>,
    kind: &str,
    lookup: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<T> {
    match matches.len() {
        0 => {
            diagnostics.push(Diagnostic::error(
                format!("{} not found", kind),
                format!("No {} matches {}", kind, lookup),
            ));
            None
        }
        1 => matches.pop(),
        n => {
            diagnostics.push(Diagnostic::warning(
                format!("Multiple {}s found", kind),
                format!("{} objects match {}; using the first one", n, lookup),
            ));
            Some(matches.swap_remove(0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_single_uses_first_of_many_with_warning() {
        let mut diagnostics = vec![];
        let picked = select_single(vec!["a", "b"], "asset group", "name \"prod\"", &mut diagnostics);

        assert_eq!(picked, Some("a"));
        assert_eq!(diagnostics.len(), 1);
        assert!(!diagnostics[0].is_error());
        assert!(diagnostics[0].detail.contains("2 objects"));
    }

    #[test]
    fn select_single_errors_without_match() {
        let mut diagnostics = vec![];
        let picked: Option<u8> = select_single(vec![], "cloud account", "account_id \"1\"", &mut diagnostics);

        assert!(picked.is_none());
        assert!(diagnostics[0].is_error());
        assert_eq!(diagnostics[0].summary, "cloud account not found");
    }
}
