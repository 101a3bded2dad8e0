//! Integration tests for hash crate

#[cfg(test)]
mod tests {
    use shipwright_hash::*;
    use tempfile::tempdir;
    use tokio::fs;

    #[tokio::test]
    async fn test_verify_file() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("test.txt");

        let data = b"verify this content";
        fs::write(&file_path, data).await.unwrap();

        let hash = Hash::from_data(data);
        assert!(verify_file(&file_path, &hash).await.unwrap());

        let wrong_hash = Hash::from_data(b"different content");
        assert!(!verify_file(&file_path, &wrong_hash).await.unwrap());
    }

    #[test]
    fn test_hash_from_hex_errors() {
        // Too short
        let result = Hash::from_hex("1234");
        assert!(result.is_err());

        // Too long
        let result = Hash::from_hex(&"a".repeat(65));
        assert!(result.is_err());

        // Invalid hex
        let result = Hash::from_hex("xyz123");
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_tree_hash_matches_file_hash() {
        let dir = tempdir().unwrap();
        let data = b"artifact payload";
        fs::write(dir.path().join("payload.bin"), data).await.unwrap();

        let hasher = TreeHasher::new(TreeHasherConfig::default());
        let records = hasher.hash_tree(dir.path()).await.unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].hash, Hash::from_data(data));
        assert_eq!(records[0].size, data.len() as u64);
    }
}
