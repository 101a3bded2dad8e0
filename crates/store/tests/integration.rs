//! Integration tests for store crate

#[cfg(test)]
mod tests {
    use shipwright_store::*;
    use tempfile::tempdir;
    use tokio::fs;

    async fn create_stage_output(dir: &std::path::Path) {
        fs::create_dir_all(dir.join("bin")).await.unwrap();
        fs::write(dir.join("bin/launcher"), b"#!/bin/sh\necho run\n")
            .await
            .unwrap();
        fs::create_dir_all(dir.join("lib")).await.unwrap();
        fs::write(dir.join("lib/core.so"), b"binary content")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_artifact_archive_roundtrip() {
        let temp = tempdir().unwrap();
        let store = ArtifactStore::create(temp.path().join("store"))
            .await
            .unwrap();
        let out_dir = temp.path().join("out");
        let archive = temp.path().join("bin_arm64.tar");
        let extract_dir = temp.path().join("extracted");

        create_stage_output(&out_dir).await;
        store.publish("bin_arm64", "build_arm64", &out_dir).await.unwrap();

        store.export("bin_arm64", &archive).await.unwrap();
        assert!(archive.exists());

        import_artifact(&archive, &extract_dir).await.unwrap();

        assert!(extract_dir.join(RECEIPT_FILE).exists());
        assert!(extract_dir.join("files/bin/launcher").exists());
        assert!(extract_dir.join("files/lib/core.so").exists());

        let script = fs::read_to_string(extract_dir.join("files/bin/launcher"))
            .await
            .unwrap();
        assert_eq!(script, "#!/bin/sh\necho run\n");
    }

    #[tokio::test]
    async fn test_receipt_records_every_file() {
        let temp = tempdir().unwrap();
        let store = ArtifactStore::create(temp.path().join("store"))
            .await
            .unwrap();
        let out_dir = temp.path().join("out");
        create_stage_output(&out_dir).await;

        let receipt = store
            .publish("bin_arm64", "build_arm64", &out_dir)
            .await
            .unwrap();

        assert_eq!(receipt.file_count(), 2);
        assert!(receipt.total_size() > 0);
        let paths: Vec<&str> = receipt
            .files
            .iter()
            .map(|f| f.relative_path.as_str())
            .collect();
        assert_eq!(paths, vec!["bin/launcher", "lib/core.so"]);

        // Receipt on disk matches what publish returned
        let loaded = store.receipt("bin_arm64").await.unwrap();
        assert_eq!(loaded.files.len(), receipt.files.len());
        assert_eq!(loaded.producer, "build_arm64");
    }

    #[tokio::test]
    async fn test_stored_artifact_operations() {
        let temp = tempdir().unwrap();
        let store = ArtifactStore::create(temp.path().join("store"))
            .await
            .unwrap();
        let out_dir = temp.path().join("out");
        create_stage_output(&out_dir).await;
        store.publish("bin_arm64", "build_arm64", &out_dir).await.unwrap();

        let stored = StoredArtifact::load(&store.artifact_path("bin_arm64"))
            .await
            .unwrap();
        assert_eq!(stored.receipt().artifact, "bin_arm64");

        stored.verify().await.unwrap();

        // Consumers get an independent copy
        let dest = temp.path().join("in/bin_arm64");
        stored.materialize_to(&dest).await.unwrap();
        fs::write(dest.join("bin/launcher"), b"rewritten").await.unwrap();
        stored.verify().await.unwrap();
    }

    #[tokio::test]
    async fn test_import_rejects_duplicate_name() {
        let temp = tempdir().unwrap();
        let store = ArtifactStore::create(temp.path().join("store"))
            .await
            .unwrap();
        let out_dir = temp.path().join("out");
        create_stage_output(&out_dir).await;
        store.publish("bin_arm64", "build_arm64", &out_dir).await.unwrap();

        let archive = temp.path().join("bin_arm64.tar");
        store.export("bin_arm64", &archive).await.unwrap();

        let err = store.import(&archive).await.unwrap_err();
        assert!(err.to_string().contains("already published"));
    }
}
