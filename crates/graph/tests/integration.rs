//! Integration tests for pipeline planning

#[cfg(test)]
mod tests {
    use shipwright_graph::{ExecutionPlan, InstanceKind, PipelineSpec};
    use shipwright_types::ReleaseTag;

    const RELEASE_PIPELINE: &str = r#"
name = "cpython"

[axes]
arch = ["amd64", "arm64"]
flavor = [
    { value = "default", suffix = "" },
    { value = "free-threaded", suffix = "t" },
]

[stages.build]
matrix = ["arch", "flavor"]
produces = ["unsigned_bin"]
commands = [
    ["./configure", "--arch", "${arch}", "--flavor", "${flavor}"],
    ["make", "-j8"],
]
pool = "builders"

[stages.sign]
matrix = ["arch", "flavor"]
consumes = ["unsigned_bin"]
produces = ["bin"]
sign = true

[stages.pack]
matrix = ["arch", "flavor"]
consumes = ["bin"]
produces = ["pkg"]
commands = [["pack.sh", "${VERSION}"]]

[stages.merge]
consumes = ["pkg_amd64", "pkg_amd64_t", "pkg_arm64", "pkg_arm64_t"]
produces = ["release_tree"]
commands = [["merge.sh"]]

[stages.publish]
needs = ["merge"]
consumes = ["release_tree"]
commands = [["upload.sh"]]
condition = "stable-only"
"#;

    fn tag(s: &str) -> ReleaseTag {
        s.parse().unwrap()
    }

    #[test]
    fn test_release_pipeline_plan_for_stable_tag() {
        let spec = PipelineSpec::from_toml_str(RELEASE_PIPELINE).unwrap();
        let plan = ExecutionPlan::build(&spec, &tag("3.13.0rc1")).unwrap();

        assert_eq!(plan.pipeline, "cpython");
        assert_eq!(plan.instance_count(), 14);
        assert!(plan.gated_off.is_empty());

        assert_eq!(plan.levels.len(), 5);
        assert_eq!(
            plan.levels[0],
            vec!["build_amd64", "build_amd64_t", "build_arm64", "build_arm64_t"]
        );
        assert_eq!(plan.levels[3], vec!["merge"]);
        assert_eq!(plan.levels[4], vec!["publish"]);

        // Variant suffixes thread through artifact handoff
        assert_eq!(plan.artifacts["unsigned_bin_arm64_t"], "build_arm64_t");
        assert_eq!(plan.artifacts["bin_arm64_t"], "sign_arm64_t");
        assert_eq!(plan.artifacts["release_tree"], "merge");

        let sign = plan.instance("sign_amd64_t").unwrap();
        assert_eq!(sign.kind, InstanceKind::Sign);
        assert_eq!(sign.consumes[0].base, "unsigned_bin");
        assert_eq!(sign.consumes[0].name, "unsigned_bin_amd64_t");
        assert_eq!(sign.produces[0].base, "bin");
        assert_eq!(sign.produces[0].name, "bin_amd64_t");

        // Command templates are carried literally; they expand at execution
        let build = plan.instance("build_arm64").unwrap();
        assert_eq!(build.commands[0][2], "${arch}");
        assert_eq!(build.pool.as_deref(), Some("builders"));

        let tools: Vec<String> = plan.required_tools().into_iter().collect();
        assert_eq!(tools, vec!["./configure", "make", "merge.sh", "pack.sh", "upload.sh"]);
    }

    #[test]
    fn test_prerelease_tag_gates_publish() {
        let spec = PipelineSpec::from_toml_str(RELEASE_PIPELINE).unwrap();
        let plan = ExecutionPlan::build(&spec, &tag("3.14.0a2")).unwrap();

        assert_eq!(plan.instance_count(), 13);
        assert_eq!(plan.gated_off, vec!["publish"]);
        assert_eq!(plan.levels.len(), 4);
        assert!(plan.instance("publish").is_none());

        // A failed build strands its whole variant column but not siblings
        let affected = plan.transitive_dependents("build_arm64_t");
        assert!(affected.contains("sign_arm64_t"));
        assert!(affected.contains("pack_arm64_t"));
        assert!(affected.contains("merge"));
        assert!(!affected.contains("pack_amd64"));
    }

    #[tokio::test]
    async fn test_load_pipeline_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("release.toml");
        tokio::fs::write(&path, RELEASE_PIPELINE).await.unwrap();

        let spec = PipelineSpec::load(&path).await.unwrap();
        assert_eq!(spec.name, "cpython");
        assert_eq!(spec.stages.len(), 5);

        let missing = dir.path().join("nope.toml");
        let err = PipelineSpec::load(&missing).await.unwrap_err();
        assert!(err.to_string().contains("I/O error"));
    }
}
