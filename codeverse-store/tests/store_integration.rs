use codeverse_core::{ActivityKind, Language, Project, ProjectFile, Session, User};
use codeverse_store::{AppStore, StoreConfig};
use tempfile::tempdir;
use uuid::Uuid;

#[test]
fn test_delete_project_cascades() {
    let dir = tempdir().unwrap();
    let store = AppStore::open(StoreConfig::for_testing(dir.path().join("app"))).unwrap();

    let owner = Uuid::new_v4();
    let project = Project::new(owner, "demo", Language::JavaScript);
    store.create_project(&project, owner).unwrap();

    let files: Vec<_> = ["index.js", "util.js", "page.html"]
        .iter()
        .map(|name| {
            let lang = Language::from_filename(name).unwrap_or_default();
            let file = ProjectFile::new(project.id, *name, lang);
            store.create_file(&file, owner).unwrap();
            file
        })
        .collect();
    store.update_file_lines(files[0].room_id, 40).unwrap();

    let kept = Project::new(owner, "kept", Language::Python);
    store.create_project(&kept, owner).unwrap();

    let removed = store.delete_project(project.id).unwrap();
    assert_eq!(removed.files_count, 3);
    assert_eq!(removed.lines_of_code, 40);

    assert!(store.get_project(project.id).unwrap().is_none());
    assert!(store.list_files(project.id).unwrap().is_empty());
    assert!(store.list_activity(project.id, 100).unwrap().is_empty());
    for file in &files {
        assert!(store.get_file(file.id).unwrap().is_none());
        assert!(store.find_file_by_room(file.room_id).unwrap().is_none());
    }

    let remaining = store.list_projects(owner).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, kept.id);
    assert_eq!(store.list_activity(kept.id, 10).unwrap().len(), 1);
}

#[test]
fn test_delete_missing_project_is_not_found() {
    let dir = tempdir().unwrap();
    let store = AppStore::open(StoreConfig::for_testing(dir.path())).unwrap();
    let err = store.delete_project(Uuid::new_v4()).unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_everything_survives_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("app");
    let user = User::new("dev", "dev@example.com", "$argon2id$stub".into());
    let project = Project::new(user.id, "persisted", Language::Java);
    let file = ProjectFile::new(project.id, "Main.java", Language::Java);

    {
        let store = AppStore::open(StoreConfig::for_testing(&path)).unwrap();
        store.insert_user(&user).unwrap();
        store
            .put_session(&Session {
                token: "abc".into(),
                user_id: user.id,
                created_at: 1,
                expires_at: u64::MAX,
            })
            .unwrap();
        store.create_project(&project, user.id).unwrap();
        store.create_file(&file, user.id).unwrap();
        store.update_file_lines(file.room_id, 9).unwrap();
    }

    let store = AppStore::open(StoreConfig::for_testing(&path)).unwrap();
    assert_eq!(store.find_user_by_email("dev@example.com").unwrap(), Some(user.clone()));
    assert_eq!(store.get_session("abc").unwrap().unwrap().user_id, user.id);
    assert_eq!(store.find_file_by_room(file.room_id).unwrap().unwrap().lines, 9);

    let log = store.list_activity(project.id, 10).unwrap();
    assert!(matches!(log.last().unwrap().kind, ActivityKind::ProjectCreated { .. }));

    // Sequence numbers continue after reopen
    let next = store
        .append_activity(project.id, Some(user.id), ActivityKind::FileDeleted { filename: "x".into() })
        .unwrap();
    assert_eq!(next.sequence, 3);
}
