//! Integration tests for the release index

#[cfg(test)]
mod tests {
    use shipwright_manifest::{
        declared_id, load_entry, manifest_path, ReleaseEntry, ReleaseIndex, ReleaseManifest,
        SortKey,
    };
    use shipwright_types::ReleaseTag;
    use tempfile::tempdir;

    fn entry(package: &str, version: &str, variant: &str) -> ReleaseEntry {
        let tag: ReleaseTag = version.parse().unwrap();
        let id = declared_id(package, &tag, variant);
        let url = format!("https://dl.example.org/{package}/{version}/{id}.tar");
        let mut entry = ReleaseEntry::new(package, &tag, variant, url);
        entry.set_hash("ab".repeat(32), 1024);
        entry
    }

    #[tokio::test]
    async fn test_index_round_trip() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("index.json");

        let mut index = ReleaseIndex::default();
        index
            .merge(vec![
                entry("cpython", "3.14.0a1", "amd64"),
                entry("cpython", "3.14.0a1", "arm64"),
                entry("launcher", "1.2.0", ""),
            ])
            .unwrap();

        index.save(&path).await.unwrap();
        let loaded = ReleaseIndex::load(&path).await.unwrap();
        assert_eq!(loaded, index);
        assert_eq!(loaded.total_entries(), 3);

        // A missing index is an empty index
        let missing = ReleaseIndex::load(&temp.path().join("absent.json"))
            .await
            .unwrap();
        assert!(missing.is_empty());
    }

    #[test]
    fn test_merge_orders_new_block_numerically() {
        let mut index = ReleaseIndex::default();
        index.merge(vec![entry("cpython", "3.8.0", "")]).unwrap();

        let report = index
            .merge(vec![
                entry("cpython", "3.10.0", ""),
                entry("cpython", "3.9.0", ""),
            ])
            .unwrap();
        assert_eq!(report.added.get("cpython"), Some(&2));
        assert_eq!(report.added_total(), 2);

        // The new block leads, in numeric order; 3.10 sorts after 3.9
        let ids: Vec<&str> = index
            .versions("cpython")
            .iter()
            .map(|e| e.id.as_str())
            .collect();
        assert_eq!(ids, vec!["cpython-3.9.0", "cpython-3.10.0", "cpython-3.8.0"]);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let batch = vec![
            entry("cpython", "3.13.1", "amd64"),
            entry("cpython", "3.13.1", "arm64"),
        ];
        let mut index = ReleaseIndex::default();
        index.merge(batch.clone()).unwrap();

        let report = index.merge(batch).unwrap();
        assert_eq!(report.unchanged, 2);
        assert!(report.added.is_empty());
        assert!(report.divergent.is_empty());
        assert_eq!(index.total_entries(), 2);
    }

    #[test]
    fn test_divergent_duplicate_is_replaced_and_reported() {
        let mut index = ReleaseIndex::default();
        index
            .merge(vec![entry("cpython", "3.13.1", "amd64")])
            .unwrap();

        let mut moved = entry("cpython", "3.13.1", "amd64");
        moved.url = "https://mirror.example.org/cpython-3.13.1-amd64.tar".to_string();
        let report = index.merge(vec![moved]).unwrap();

        assert_eq!(report.divergent, vec!["cpython-3.13.1-amd64".to_string()]);
        assert_eq!(index.total_entries(), 1);
        assert!(index.versions("cpython")[0].url.starts_with("https://mirror"));
    }

    #[test]
    fn test_merge_validation() {
        let mut index = ReleaseIndex::default();

        let mut unhashed = entry("cpython", "3.13.1", "");
        unhashed.hash = None;
        let err = index.merge(vec![unhashed]).unwrap_err();
        assert!(err.to_string().contains("has no hash"));

        let mut bad_url = entry("cpython", "3.13.1", "");
        bad_url.url = "dl.example.org/x.tar".to_string();
        let err = index.merge(vec![bad_url]).unwrap_err();
        assert!(err.to_string().contains("invalid download URL"));

        let mut blank = entry("cpython", "3.13.1", "");
        blank.id = String::new();
        let err = index.merge(vec![blank]).unwrap_err();
        assert!(err.to_string().contains("empty id"));

        assert!(index.is_empty());
    }

    #[test]
    fn test_declared_identifier_is_stable() {
        let tag: ReleaseTag = "3.14.0rc1".parse().unwrap();

        assert_eq!(declared_id("cpython", &tag, "amd64"), "cpython-3.14.0rc1-amd64");
        assert_eq!(
            declared_id("cpython", &tag, "amd64"),
            declared_id("cpython", &tag, "amd64")
        );
        assert_eq!(declared_id("cpython", &tag, ""), "cpython-3.14.0rc1");
        assert_ne!(
            declared_id("cpython", &tag, "amd64"),
            declared_id("cpython", &tag, "arm64")
        );
        assert_eq!(
            entry("cpython", "3.14.0rc1", "amd64").id,
            "cpython-3.14.0rc1-amd64"
        );
    }

    #[test]
    fn test_sort_key_compares_digit_runs_as_numbers() {
        assert!(SortKey::of("3.10") > SortKey::of("3.9"));
        assert!(SortKey::of("3.14.0rc2") > SortKey::of("3.14.0rc1"));
        assert!(SortKey::of("3.14.0rc10") > SortKey::of("3.14.0rc9"));
        assert!(SortKey::of("3.14.0b10") < SortKey::of("3.14.0rc1"));
        assert_eq!(SortKey::of("3.14.0"), SortKey::of("3.14.0"));
    }

    #[test]
    fn test_release_lookup() {
        let mut index = ReleaseIndex::default();
        index
            .merge(vec![
                entry("cpython", "3.13.1", "amd64"),
                entry("cpython", "3.13.1", "arm64"),
                entry("cpython", "3.10.0", "amd64"),
                entry("cpython", "3.9.9", "amd64"),
            ])
            .unwrap();

        let both = index.release("cpython", "3.13.1").unwrap();
        assert_eq!(both.len(), 2);

        let latest = index.latest("cpython").unwrap();
        assert_eq!(latest.version, "3.13.1");

        let err = index.release("pypy", "1.0.0").unwrap_err();
        assert!(err.to_string().contains("not found in index"));
        let err = index.release("cpython", "3.0.0").unwrap_err();
        assert!(err.to_string().contains("not found for package"));
        assert!(index.versions("pypy").is_empty());
    }

    #[tokio::test]
    async fn test_release_manifest_file() {
        let temp = tempdir().unwrap();
        let tag: ReleaseTag = "3.14.0a1".parse().unwrap();

        let index_path = temp.path().join("index.json");
        let path = manifest_path(&index_path, &tag);
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "index.3.14.0a1.json"
        );

        let manifest = ReleaseManifest::new(vec![entry("cpython", "3.14.0a1", "amd64")]);
        manifest.save(&path).await.unwrap();

        let loaded: ReleaseManifest =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.versions.len(), 1);
        assert_eq!(loaded.versions[0].id, "cpython-3.14.0a1-amd64");
    }

    #[tokio::test]
    async fn test_load_entry_descriptor() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("cpython.install.json");
        std::fs::write(
            &path,
            r#"{
  "id": "cpython-3.14.0a1-amd64",
  "package": "cpython",
  "version": "3.14.0a1",
  "variant": "amd64",
  "url": "https://dl.example.org/cpython/3.14.0a1/cpython-3.14.0a1-amd64.tar"
}"#,
        )
        .unwrap();

        let entry = load_entry(&path).await.unwrap();
        assert_eq!(entry.id, "cpython-3.14.0a1-amd64");
        assert_eq!(entry.variant, "amd64");
        assert!(entry.hash.is_none());
        assert!(entry.size.is_none());

        std::fs::write(&path, "{not json").unwrap();
        let err = load_entry(&path).await.unwrap_err();
        assert!(err.to_string().contains("failed to parse index"));
    }
}
