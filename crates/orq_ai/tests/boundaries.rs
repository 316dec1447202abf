use std::fs;
use std::path::{Path, PathBuf};

fn collect_rs_files(root: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(p) = stack.pop() {
        let entries = match fs::read_dir(&p) {
            Ok(e) => e,
            Err(_) => continue,
        };
        for ent in entries.flatten() {
            let path = ent.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.extension().and_then(|s| s.to_str()) == Some("rs") {
                out.push(path);
            }
        }
    }
    out.sort();
    out
}

#[test]
fn synthesizer_reaches_evidence_only_through_the_retrieve_tool() {
    // The answer loop must not touch the index or embedder directly; every cited record
    // has to come through the callback so the citation check sees it.
    let src_root = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("src/answer");
    let files = collect_rs_files(&src_root);
    assert!(!files.is_empty());

    for f in files {
        let text = fs::read_to_string(&f).unwrap_or_default();
        for forbidden in ["crate::index", "crate::embeddings", "IndexSnapshot", "IndexHandle"] {
            assert!(
                !text.contains(forbidden),
                "{forbidden} referenced from {}",
                f.display()
            );
        }
    }
}

#[test]
fn model_endpoints_stay_on_loopback() {
    let src_root = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("src");
    for f in collect_rs_files(&src_root) {
        let text = fs::read_to_string(&f).unwrap_or_default();
        let text = text.split("#[cfg(test)]").next().unwrap_or_default();
        assert!(!text.contains("https://"), "remote URL found in {}", f.display());
        for line in text.lines().filter(|l| l.contains("http://")) {
            assert!(
                line.contains("127.0.0.1"),
                "non-loopback URL in {}: {line}",
                f.display()
            );
        }
    }
}
