// ABOUTME: Reconciles file headers, DB columns and the configured allow-list
// ABOUTME: Produces the effective sync-column set in file-header order

use crate::error::{Result, SyncError};

/// Compute the effective sync-column set.
///
/// The result is the intersection of file headers and DB columns, narrowed by
/// the allow-list when one is configured, preserving the header order. The
/// intersection rule tolerates extra columns on either side; the allow-list
/// can only narrow the set, never broaden it.
///
/// When `primary_key` is non-empty it must survive into the result.
pub fn reconcile_columns(
    table: &str,
    headers: &[String],
    db_columns: &[String],
    allow_list: &[String],
    primary_key: &str,
) -> Result<Vec<String>> {
    if headers.is_empty() {
        return Err(SyncError::EmptySourceHeader {
            table: table.to_string(),
        });
    }

    let mut sync_columns: Vec<String> = Vec::new();
    for header in headers {
        if sync_columns.iter().any(|c| c == header) {
            continue;
        }
        if !db_columns.iter().any(|c| c == header) {
            continue;
        }
        if !allow_list.is_empty() && !allow_list.iter().any(|c| c == header) {
            continue;
        }
        sync_columns.push(header.clone());
    }

    if sync_columns.is_empty() {
        return Err(SyncError::NoCommonColumns {
            table: table.to_string(),
        });
    }

    if !primary_key.is_empty() && !sync_columns.iter().any(|c| c == primary_key) {
        return Err(SyncError::PrimaryKeyNotInSyncColumns {
            table: table.to_string(),
            column: primary_key.to_string(),
        });
    }

    Ok(sync_columns)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_intersection_keeps_header_order() {
        let sync = reconcile_columns(
            "users",
            &cols(&["id", "name", "email", "extra"]),
            &cols(&["email", "id", "name", "db_only"]),
            &[],
            "id",
        )
        .unwrap();
        assert_eq!(sync, cols(&["id", "name", "email"]));
    }

    #[test]
    fn test_allow_list_narrows() {
        let sync = reconcile_columns(
            "users",
            &cols(&["id", "name", "email"]),
            &cols(&["id", "name", "email"]),
            &cols(&["id", "email"]),
            "id",
        )
        .unwrap();
        assert_eq!(sync, cols(&["id", "email"]));
    }

    #[test]
    fn test_allow_list_cannot_broaden() {
        let sync = reconcile_columns(
            "users",
            &cols(&["id", "name"]),
            &cols(&["id", "name"]),
            &cols(&["id", "name", "phantom"]),
            "id",
        )
        .unwrap();
        assert_eq!(sync, cols(&["id", "name"]));
    }

    #[test]
    fn test_empty_header_fails() {
        assert!(matches!(
            reconcile_columns("users", &[], &cols(&["id"]), &[], ""),
            Err(SyncError::EmptySourceHeader { .. })
        ));
    }

    #[test]
    fn test_disjoint_columns_fail() {
        assert!(matches!(
            reconcile_columns("users", &cols(&["a", "b"]), &cols(&["x", "y"]), &[], ""),
            Err(SyncError::NoCommonColumns { .. })
        ));
    }

    #[test]
    fn test_primary_key_must_be_in_result() {
        assert!(matches!(
            reconcile_columns(
                "users",
                &cols(&["name", "email"]),
                &cols(&["id", "name", "email"]),
                &[],
                "id",
            ),
            Err(SyncError::PrimaryKeyNotInSyncColumns { .. })
        ));
    }

    #[test]
    fn test_empty_primary_key_skips_membership_check() {
        let sync = reconcile_columns(
            "users",
            &cols(&["name"]),
            &cols(&["id", "name"]),
            &[],
            "",
        )
        .unwrap();
        assert_eq!(sync, cols(&["name"]));
    }

    #[test]
    fn test_duplicate_headers_deduped() {
        let sync = reconcile_columns(
            "users",
            &cols(&["id", "name", "id"]),
            &cols(&["id", "name"]),
            &[],
            "id",
        )
        .unwrap();
        assert_eq!(sync, cols(&["id", "name"]));
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let headers = cols(&["id", "name", "email", "extra"]);
        let db = cols(&["id", "name", "email"]);
        let allow = cols(&["id", "name", "email"]);

        let first = reconcile_columns("users", &headers, &db, &allow, "id").unwrap();
        let second = reconcile_columns("users", &first, &db, &allow, "id").unwrap();
        assert_eq!(first, second);
    }
}
