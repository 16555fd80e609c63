#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::error::{Result, StoreError};
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::time::sleep;

    /// Backend that records commits in order and can be told to fail
    /// specific messages.
    struct RecordingBackend {
        commits: Mutex<Vec<(Vec<String>, String)>>,
        fail_messages: Mutex<Vec<String>>,
    }

    impl RecordingBackend {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                commits: Mutex::new(Vec::new()),
                fail_messages: Mutex::new(Vec::new()),
            })
        }

        fn fail_on(&self, message: &str) {
            self.fail_messages.lock().push(message.to_string());
        }

        fn recorded(&self) -> Vec<(Vec<String>, String)> {
            self.commits.lock().clone()
        }
    }

    impl VersionControlBackend for RecordingBackend {
        fn init(&self) -> Result<()> {
            Ok(())
        }

        fn commit(&self, paths: &[String], message: &str) -> Result<String> {
            if self.fail_messages.lock().iter().any(|m| m == message) {
                return Err(StoreError::Commit("induced failure".to_string()));
            }
            let mut commits = self.commits.lock();
            commits.push((paths.to_vec(), message.to_string()));
            Ok(format!("rev{}", commits.len()))
        }

        fn pending_changes(&self) -> Result<Vec<String>> {
            Ok(Vec::new())
        }

        fn commit_all(&self, message: &str) -> Result<String> {
            self.commit(&["*".to_string()], message)
        }

        fn log(&self, _path: &str) -> Result<Vec<CommitInfo>> {
            Ok(Vec::new())
        }

        fn show_at_revision(&self, _path: &str, _revision: &str) -> Result<Option<VersionContent>> {
            Ok(None)
        }

        fn checkout_path_at_revision(&self, _path: &str, _revision: &str) -> Result<()> {
            Ok(())
        }
    }

    async fn wait_for_commits(backend: &RecordingBackend, count: usize) {
        for _ in 0..100 {
            if backend.recorded().len() >= count {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "expected {count} commits, saw {}",
            backend.recorded().len()
        );
    }

    #[tokio::test]
    async fn sync_commits_apply_before_returning() {
        let backend = RecordingBackend::new();
        let vcs = VersionControl::new(backend.clone(), CommitMode::Sync);
        vcs.commit_file("a.md", "Created page: a.md").await.unwrap();
        vcs.commit_file("b.md", "Created page: b.md").await.unwrap();
        let recorded = backend.recorded();
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[0].0, vec!["a.md".to_string()]);
        assert_eq!(recorded[1].0, vec!["b.md".to_string()]);
    }

    #[tokio::test]
    async fn concurrent_commits_never_interleave_paths() {
        let backend = RecordingBackend::new();
        let vcs = Arc::new(VersionControl::new(backend.clone(), CommitMode::Sync));
        let mut handles = Vec::new();
        for i in 0..16 {
            let vcs = vcs.clone();
            handles.push(tokio::spawn(async move {
                let path = format!("page{i}.md");
                vcs.commit_file(&path, &format!("Updated page: {path}"))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        let recorded = backend.recorded();
        assert_eq!(recorded.len(), 16);
        // every commit carries exactly the single path it was given
        for (paths, message) in &recorded {
            assert_eq!(paths.len(), 1);
            assert!(message.ends_with(&paths[0]));
        }
    }

    #[tokio::test]
    async fn sync_commit_failure_reaches_the_caller() {
        let backend = RecordingBackend::new();
        backend.fail_on("Updated page: bad.md");
        let vcs = VersionControl::new(backend.clone(), CommitMode::Sync);
        let err = vcs
            .commit_file("bad.md", "Updated page: bad.md")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Commit(_)));
    }

    #[tokio::test]
    async fn failed_commit_does_not_stall_the_queue() {
        let backend = RecordingBackend::new();
        backend.fail_on("Updated page: bad.md");
        let vcs = VersionControl::new(backend.clone(), CommitMode::Background);
        vcs.commit_file("bad.md", "Updated page: bad.md")
            .await
            .unwrap();
        vcs.commit_file("good.md", "Updated page: good.md")
            .await
            .unwrap();
        wait_for_commits(&backend, 1).await;
        let recorded = backend.recorded();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].0, vec!["good.md".to_string()]);
    }

    fn write(root: &std::path::Path, rel: &str, content: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn git_backend_open_and_init_are_idempotent() {
        let dir = TempDir::new().unwrap();
        let backend = GitBackend::open(dir.path()).unwrap();
        backend.init().unwrap();
        backend.init().unwrap();
        drop(backend);
        let reopened = GitBackend::open(dir.path()).unwrap();
        reopened.init().unwrap();
        assert!(dir.path().join(".git").exists());
    }

    #[tokio::test]
    async fn git_backend_history_is_newest_first() {
        let dir = TempDir::new().unwrap();
        let backend = GitBackend::open(dir.path()).unwrap();
        backend.init().unwrap();

        assert!(backend.log("a.md").unwrap().is_empty());

        write(dir.path(), "a.md", "one");
        backend.commit(&["a.md".to_string()], "Created page: a.md").unwrap();
        write(dir.path(), "a.md", "two");
        backend.commit(&["a.md".to_string()], "Updated page: a.md").unwrap();
        // a commit on another path must not appear in a.md's history
        write(dir.path(), "b.md", "other");
        backend.commit(&["b.md".to_string()], "Created page: b.md").unwrap();

        let history = backend.log("a.md").unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].message.contains("Updated"));
        assert!(history[1].message.contains("Created"));
    }

    #[tokio::test]
    async fn git_backend_reads_content_at_a_revision() {
        let dir = TempDir::new().unwrap();
        let backend = GitBackend::open(dir.path()).unwrap();
        backend.init().unwrap();

        write(dir.path(), "note.md", "# v1");
        backend
            .commit(&["note.md".to_string()], "Created page: note.md")
            .unwrap();
        write(dir.path(), "note.md", "# v2");
        backend
            .commit(&["note.md".to_string()], "Updated page: note.md")
            .unwrap();

        let history = backend.log("note.md").unwrap();
        let oldest = &history[1];
        let version = backend
            .show_at_revision("note.md", &oldest.hash)
            .unwrap()
            .expect("path existed at that revision");
        assert_eq!(version.content, "# v1");
        assert_eq!(version.commit.hash, oldest.hash);

        // a path absent at that revision is absent, not an error
        assert!(backend
            .show_at_revision("missing.md", &oldest.hash)
            .unwrap()
            .is_none());

        // an unknown revision is an error
        let err = backend
            .show_at_revision("note.md", "0000000000000000000000000000000000000000")
            .unwrap_err();
        assert!(matches!(err, StoreError::VersionNotFound { .. }));
    }

    #[tokio::test]
    async fn git_backend_checkout_restores_the_working_copy() {
        let dir = TempDir::new().unwrap();
        let backend = GitBackend::open(dir.path()).unwrap();
        backend.init().unwrap();

        write(dir.path(), "note.md", "A");
        backend
            .commit(&["note.md".to_string()], "Created page: note.md")
            .unwrap();
        write(dir.path(), "note.md", "B");
        backend
            .commit(&["note.md".to_string()], "Updated page: note.md")
            .unwrap();

        let history = backend.log("note.md").unwrap();
        backend
            .checkout_path_at_revision("note.md", &history[1].hash)
            .unwrap();
        let restored = std::fs::read_to_string(dir.path().join("note.md")).unwrap();
        assert_eq!(restored, "A");
        // the checkout itself added no revision
        assert_eq!(backend.log("note.md").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn git_backend_commits_deletions() {
        let dir = TempDir::new().unwrap();
        let backend = GitBackend::open(dir.path()).unwrap();
        backend.init().unwrap();

        write(dir.path(), "gone.md", "content");
        backend
            .commit(&["gone.md".to_string()], "Created page: gone.md")
            .unwrap();
        std::fs::remove_file(dir.path().join("gone.md")).unwrap();
        backend
            .commit(&["gone.md".to_string()], "Deleted page: gone.md")
            .unwrap();

        let history = backend.log("gone.md").unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].message.contains("Deleted"));
    }

    #[tokio::test]
    async fn git_backend_folds_in_external_changes() {
        let dir = TempDir::new().unwrap();
        let backend = GitBackend::open(dir.path()).unwrap();
        backend.init().unwrap();

        write(dir.path(), "dropped.md", "came from outside");
        let pending = backend.pending_changes().unwrap();
        assert_eq!(pending, vec!["dropped.md".to_string()]);

        backend.commit_all("Commit external file changes").unwrap();
        assert!(backend.pending_changes().unwrap().is_empty());
        let history = backend.log("dropped.md").unwrap();
        assert_eq!(history.len(), 1);
    }
}
