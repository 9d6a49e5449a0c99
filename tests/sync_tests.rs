//! Integration tests for output archiving, batch uploads and downloads
//! against the local storage provider.

use std::fs;
use std::path::Path;

use kdcli::metadata::{MetadataStore, SyncEventKind};
use kdcli::sync::{
    archive_outputs, download_to, ensure_folder_path, resolve_folder, upload_path, DriveLayout,
    FileEvent, FileQuery, LocalProvider, RemoteStorage, SyncOptions,
};
use tempfile::TempDir;

struct Workspace {
    temp: TempDir,
    provider: LocalProvider,
    store: MetadataStore,
}

impl Workspace {
    fn new() -> Self {
        let temp = TempDir::new().expect("temp dir");
        let provider = LocalProvider::new(temp.path().join("remote")).expect("provider");
        let store = MetadataStore::new(temp.path().join("metadata.json"));
        Self {
            temp,
            provider,
            store,
        }
    }

    fn outputs(&self, files: &[(&str, &str)]) -> std::path::PathBuf {
        let dir = self.temp.path().join("outputs");
        for (name, content) in files {
            let path = dir.join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        dir
    }

    fn archive(&self, dir: &Path, folder: &str, force: bool) -> kdcli::sync::SyncReport {
        archive_outputs(
            &self.provider,
            &self.store,
            "alice/demo",
            dir,
            folder,
            SyncOptions { force },
            |_| {},
        )
        .unwrap()
    }
}

// ============================================================================
// Output archiving
// ============================================================================

mod archive {
    use super::*;

    #[test]
    fn test_first_sync_uploads_everything() {
        let ws = Workspace::new();
        let folder = ensure_folder_path(&ws.provider, "Kaggle-CLI/Outputs").unwrap();
        let dir = ws.outputs(&[("submission.csv", "id,target\n1,0\n"), ("logs/train.log", "ok")]);

        let report = ws.archive(&dir, &folder, false);
        assert!(report.is_complete());
        assert_eq!(report.uploaded.len(), 2);
        assert!(report.skipped.is_empty());

        let remote = ws.provider.find(&FileQuery::children_of(&folder)).unwrap();
        let names: Vec<_> = remote.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["logs", "submission.csv"]);
        assert!(remote[0].is_folder());
        assert!(ws.provider.root().join("Kaggle-CLI/Outputs/logs/train.log").is_file());

        let metadata = ws.store.load().unwrap();
        let record = metadata.kernel("alice/demo").unwrap();
        assert_eq!(record.drive_folder, folder);
        assert_eq!(record.files.len(), 2);
        assert!(record.files.iter().all(|f| f.sha256.is_some()));
        assert_eq!(metadata.sync_history.len(), 1);
        assert_eq!(metadata.sync_history[0].kind, SyncEventKind::KernelSync);
        assert_eq!(metadata.sync_history[0].files_count, 2);
        assert_eq!(metadata.last_sync, Some(record.last_sync));
    }

    #[test]
    fn test_resync_skips_unchanged_files() {
        let ws = Workspace::new();
        let folder = ensure_folder_path(&ws.provider, "out").unwrap();
        let dir = ws.outputs(&[("a.csv", "1"), ("b.csv", "2")]);
        ws.archive(&dir, &folder, false);

        fs::write(dir.join("b.csv"), "changed").unwrap();
        let mut events = Vec::new();
        let report = archive_outputs(
            &ws.provider,
            &ws.store,
            "alice/demo",
            &dir,
            &folder,
            SyncOptions::default(),
            |event| {
                events.push(match event {
                    FileEvent::Uploading(name) => format!("up:{}", name),
                    FileEvent::Skipped(name) => format!("skip:{}", name),
                    FileEvent::Failed(name) => format!("fail:{}", name),
                })
            },
        )
        .unwrap();

        assert_eq!(report.skipped, vec!["a.csv".to_string()]);
        assert_eq!(report.uploaded.len(), 1);
        assert_eq!(events, vec!["skip:a.csv", "up:b.csv"]);

        // The record still lists both files
        let metadata = ws.store.load().unwrap();
        assert_eq!(metadata.kernel("alice/demo").unwrap().files.len(), 2);
        assert_eq!(metadata.sync_history.len(), 2);
        assert_eq!(
            fs::read_to_string(ws.provider.root().join("out/b.csv")).unwrap(),
            "changed"
        );
    }

    #[test]
    fn test_force_reuploads_unchanged_files() {
        let ws = Workspace::new();
        let folder = ensure_folder_path(&ws.provider, "out").unwrap();
        let dir = ws.outputs(&[("a.csv", "1")]);
        ws.archive(&dir, &folder, false);

        let report = ws.archive(&dir, &folder, true);
        assert_eq!(report.uploaded.len(), 1);
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn test_new_folder_disables_skipping() {
        let ws = Workspace::new();
        let first = ensure_folder_path(&ws.provider, "one").unwrap();
        let second = ensure_folder_path(&ws.provider, "two").unwrap();
        let dir = ws.outputs(&[("a.csv", "1")]);
        ws.archive(&dir, &first, false);

        let report = ws.archive(&dir, &second, false);
        assert_eq!(report.uploaded.len(), 1);
        assert!(ws.provider.root().join("two/a.csv").is_file());
        assert_eq!(
            ws.store.load().unwrap().kernel("alice/demo").unwrap().drive_folder,
            second
        );
    }

    #[test]
    fn test_same_file_name_in_different_directories() {
        let ws = Workspace::new();
        let folder = ensure_folder_path(&ws.provider, "out").unwrap();
        let dir = ws.outputs(&[
            ("a/model.pt", "first"),
            ("b/model.pt", "second"),
            ("a/deep/model.pt", "third"),
        ]);

        let report = ws.archive(&dir, &folder, false);
        assert!(report.is_complete());
        let mut ids: Vec<_> = report.uploaded.iter().map(|f| f.id.clone()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 3);

        let root = ws.provider.root();
        assert_eq!(fs::read_to_string(root.join("out/a/model.pt")).unwrap(), "first");
        assert_eq!(fs::read_to_string(root.join("out/b/model.pt")).unwrap(), "second");
        assert_eq!(fs::read_to_string(root.join("out/a/deep/model.pt")).unwrap(), "third");

        // A later run reuses the subfolders
        fs::write(dir.join("b/model.pt"), "retrained").unwrap();
        let report = ws.archive(&dir, &folder, false);
        assert_eq!(report.uploaded.len(), 1);
        assert_eq!(report.skipped.len(), 2);
        assert_eq!(fs::read_to_string(root.join("out/b/model.pt")).unwrap(), "retrained");
        let children = ws.provider.find(&FileQuery::children_of(&folder)).unwrap();
        assert_eq!(children.len(), 2);
    }

    #[test]
    fn test_empty_output_dir_records_zero_files() {
        let ws = Workspace::new();
        let folder = ensure_folder_path(&ws.provider, "out").unwrap();
        let dir = ws.temp.path().join("empty");
        fs::create_dir_all(&dir).unwrap();

        let report = ws.archive(&dir, &folder, false);
        assert!(report.uploaded.is_empty());
        let metadata = ws.store.load().unwrap();
        assert_eq!(metadata.sync_history[0].files_count, 0);
    }
}

// ============================================================================
// Batch upload and download
// ============================================================================

mod transfer {
    use super::*;

    #[test]
    fn test_upload_path_directory() {
        let ws = Workspace::new();
        let folder = ensure_folder_path(&ws.provider, "Uploads").unwrap();
        let dir = ws.outputs(&[("x.txt", "x"), ("nested/y.txt", "y")]);

        let mut seen = 0;
        let report = upload_path(&ws.provider, &dir, &folder, |_| seen += 1).unwrap();
        assert!(report.is_complete());
        assert_eq!(report.uploaded.len(), 2);
        assert_eq!(seen, 2);
    }

    #[test]
    fn test_upload_path_single_file() {
        let ws = Workspace::new();
        let folder = ensure_folder_path(&ws.provider, "Uploads").unwrap();
        let dir = ws.outputs(&[("only.csv", "1,2")]);

        let report = upload_path(&ws.provider, &dir.join("only.csv"), &folder, |_| {}).unwrap();
        assert_eq!(report.uploaded.len(), 1);
        assert_eq!(report.uploaded[0].1, "Uploads/only.csv");
    }

    #[test]
    fn test_upload_path_missing_source_fails() {
        let ws = Workspace::new();
        let missing = ws.temp.path().join("nope");
        assert!(upload_path(&ws.provider, &missing, "root", |_| {}).is_err());
    }

    #[test]
    fn test_download_into_directory_uses_remote_name() {
        let ws = Workspace::new();
        let folder = ensure_folder_path(&ws.provider, "Uploads").unwrap();
        let dir = ws.outputs(&[("model.bin", "weights")]);
        let report = upload_path(&ws.provider, &dir, &folder, |_| {}).unwrap();
        let file_id = &report.uploaded[0].1;

        let target_dir = ws.temp.path().join("downloads");
        fs::create_dir_all(&target_dir).unwrap();
        let written = download_to(&ws.provider, file_id, &target_dir).unwrap();
        assert_eq!(written, target_dir.join("model.bin"));
        assert_eq!(fs::read_to_string(written).unwrap(), "weights");

        let explicit = ws.temp.path().join("renamed.bin");
        let written = download_to(&ws.provider, file_id, &explicit).unwrap();
        assert_eq!(written, explicit);
        assert_eq!(fs::read_to_string(explicit).unwrap(), "weights");
    }

    #[test]
    fn test_download_unknown_file_fails() {
        let ws = Workspace::new();
        let target = ws.temp.path().join("out.bin");
        assert!(download_to(&ws.provider, "missing.bin", &target).is_err());
        assert!(!target.exists());
    }
}

// ============================================================================
// Folder layout record
// ============================================================================

mod layout {
    use super::*;

    #[test]
    fn test_resolve_folder_records_walked_paths() {
        let ws = Workspace::new();
        let layout_path = ws.temp.path().join("drive_config.json");

        let id = resolve_folder(&ws.provider, &layout_path, "Kaggle-CLI/Outputs").unwrap();
        assert_eq!(id, "Kaggle-CLI/Outputs");

        let layout = DriveLayout::load(&layout_path).unwrap();
        assert_eq!(layout.provider.as_deref(), Some("local"));
        assert_eq!(layout.folder_id("Kaggle-CLI/Outputs", "local"), Some(id.as_str()));
    }

    #[test]
    fn test_resolve_folder_prefers_record() {
        let ws = Workspace::new();
        let layout_path = ws.temp.path().join("drive_config.json");
        let mut layout = DriveLayout {
            provider: Some("local".to_string()),
            ..DriveLayout::default()
        };
        layout
            .folder_structure
            .insert("Kaggle-CLI/Outputs".to_string(), "elsewhere".to_string());
        layout.save(&layout_path).unwrap();

        let id = resolve_folder(&ws.provider, &layout_path, "Kaggle-CLI/Outputs").unwrap();
        assert_eq!(id, "elsewhere");
    }

    #[test]
    fn test_resolve_folder_ignores_record_of_other_provider() {
        let ws = Workspace::new();
        let layout_path = ws.temp.path().join("drive_config.json");
        let mut layout = DriveLayout::default();
        layout
            .folder_structure
            .insert("Kaggle-CLI".to_string(), "1AbCdriveId".to_string());
        layout.save(&layout_path).unwrap();

        let id = resolve_folder(&ws.provider, &layout_path, "Kaggle-CLI").unwrap();
        assert_eq!(id, "Kaggle-CLI");
        assert!(ws.provider.root().join("Kaggle-CLI").is_dir());
    }
}

// ============================================================================
// Folder path resolution
// ============================================================================

mod folders {
    use super::*;
    use kdcli::sync::{Media, RemoteFile};
    use std::cell::Cell;

    /// Local provider that counts folder creations.
    struct CountingStorage {
        inner: LocalProvider,
        created: Cell<usize>,
    }

    impl CountingStorage {
        fn take(&self) -> usize {
            self.created.replace(0)
        }
    }

    impl RemoteStorage for CountingStorage {
        fn name(&self) -> &'static str {
            self.inner.name()
        }

        fn root_id(&self) -> &str {
            self.inner.root_id()
        }

        fn find(&self, query: &FileQuery<'_>) -> kdcli::Result<Vec<RemoteFile>> {
            self.inner.find(query)
        }

        fn get(&self, file_id: &str) -> kdcli::Result<RemoteFile> {
            self.inner.get(file_id)
        }

        fn create_folder(&self, name: &str, parent_id: &str) -> kdcli::Result<String> {
            self.created.set(self.created.get() + 1);
            self.inner.create_folder(name, parent_id)
        }

        fn create_file(
            &self,
            name: &str,
            parent_id: &str,
            media: Media<'_>,
            mime_type: &str,
        ) -> kdcli::Result<String> {
            self.inner.create_file(name, parent_id, media, mime_type)
        }

        fn update_file(
            &self,
            file_id: &str,
            media: Media<'_>,
            mime_type: &str,
        ) -> kdcli::Result<String> {
            self.inner.update_file(file_id, media, mime_type)
        }

        fn download(&self, file_id: &str) -> kdcli::Result<Vec<u8>> {
            self.inner.download(file_id)
        }
    }

    #[test]
    fn test_ensure_folder_path_creates_only_missing_segments() {
        let temp = TempDir::new().unwrap();
        let storage = CountingStorage {
            inner: LocalProvider::new(temp.path().join("remote")).unwrap(),
            created: Cell::new(0),
        };

        let id = ensure_folder_path(&storage, "A/B/C").unwrap();
        assert_eq!(storage.take(), 3);

        assert_eq!(ensure_folder_path(&storage, "A/B/C").unwrap(), id);
        assert_eq!(storage.take(), 0);

        fs::remove_dir(temp.path().join("remote/A/B/C")).unwrap();
        assert_eq!(ensure_folder_path(&storage, "A/B/C").unwrap(), id);
        assert_eq!(storage.take(), 1);
    }

    #[test]
    fn test_archive_creates_each_subfolder_once() {
        let ws = Workspace::new();
        let storage = CountingStorage {
            inner: LocalProvider::new(ws.temp.path().join("remote")).unwrap(),
            created: Cell::new(0),
        };
        let folder = ensure_folder_path(&storage, "out").unwrap();
        storage.take();

        let dir = ws.outputs(&[("logs/a.log", "a"), ("logs/b.log", "b"), ("top.csv", "1")]);
        let report = archive_outputs(
            &storage,
            &ws.store,
            "alice/demo",
            &dir,
            &folder,
            SyncOptions::default(),
            |_| {},
        )
        .unwrap();
        assert_eq!(report.uploaded.len(), 3);
        assert_eq!(storage.take(), 1);
    }
}
