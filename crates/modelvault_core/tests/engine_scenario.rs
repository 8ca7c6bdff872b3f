use modelvault_core::db::{open_db, open_db_in_memory};
use modelvault_core::{
    hash_model_data, select_file_bridge, AutosaveOutcome, ConflictResolution, DirectoryHost,
    DiskSaveOutcome, EngineError, GraphElement, ImportDisposition, ImportReport,
    InMemoryWorkingCopy, Lifecycle, ModelData, ModelId, ModelMetadata, ModelRegistry, ModelStore,
    PersistenceEngine, SqliteModelRegistry, SqliteModelStore, TaxonomyScheme,
};
use rusqlite::Connection;
use std::sync::Arc;
use std::time::Duration;

type SqliteEngine<'conn> = PersistenceEngine<SqliteModelRegistry<'conn>, SqliteModelStore<'conn>>;

fn engine(conn: &Connection, host: DirectoryHost) -> SqliteEngine<'_> {
    PersistenceEngine::new(
        SqliteModelRegistry::try_new(conn).unwrap(),
        SqliteModelStore::try_new(conn).unwrap(),
        select_file_bridge(Arc::new(host), "json"),
    )
}

fn saved(outcome: DiskSaveOutcome) -> ModelMetadata {
    match outcome {
        DiskSaveOutcome::Saved(metadata) => metadata,
        DiskSaveOutcome::Cancelled => panic!("disk save was cancelled"),
    }
}

fn add_element(working: &mut InMemoryWorkingCopy, id: &str) {
    working
        .data_mut()
        .elements
        .push(GraphElement::new(id, format!("Element {id}")));
}

fn committed(outcome: AutosaveOutcome) -> ModelMetadata {
    match outcome {
        AutosaveOutcome::Committed(metadata) => metadata,
        other => panic!("unexpected autosave outcome: {other:?}"),
    }
}

#[test]
fn unsaved_changes_track_autosave_and_disk_saves() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("alpha.json");
    let conn = open_db_in_memory().unwrap();
    let mut engine = engine(&conn, DirectoryHost::with_save_target(&target));
    let mut working = InMemoryWorkingCopy::default();

    let created = engine.create_model("Alpha", &mut working).unwrap().metadata;
    let h0 = created.content_hash.clone();
    assert_eq!(h0, hash_model_data(working.data()));
    assert_eq!(engine.session().lifecycle(), Lifecycle::Ready);
    assert!(engine.has_unsaved_changes().unwrap());

    std::thread::sleep(Duration::from_millis(5));
    add_element(&mut working, "e-1");
    let after_first_edit = committed(engine.autosave(&working).unwrap());
    let h1 = after_first_edit.content_hash.clone();
    assert_ne!(h1, h0);
    assert!(after_first_edit.updated_at > created.updated_at);

    let on_disk = saved(engine.save_to_disk(&working).unwrap());
    assert_eq!(on_disk.last_disk_hash, Some(h1.clone()));
    assert_eq!(on_disk.filename.as_deref(), Some("alpha.json"));
    assert!(!engine.has_unsaved_changes().unwrap());
    assert!(engine.session().retained_handle().is_some());

    add_element(&mut working, "e-2");
    let h2 = committed(engine.autosave(&working).unwrap()).content_hash;
    assert_ne!(h2, h1);
    assert!(engine.has_unsaved_changes().unwrap());

    let on_disk = saved(engine.save_to_disk(&working).unwrap());
    assert_eq!(on_disk.last_disk_hash, Some(h2));
    assert!(!engine.has_unsaved_changes().unwrap());
}

#[test]
fn disk_save_commits_pending_edits_first() {
    let dir = tempfile::tempdir().unwrap();
    let conn = open_db_in_memory().unwrap();
    let mut engine = engine(&conn, DirectoryHost::with_save_target(dir.path().join("m.json")));
    let mut working = InMemoryWorkingCopy::default();
    engine.create_model("Alpha", &mut working).unwrap();

    add_element(&mut working, "e-1");
    let on_disk = saved(engine.save_to_disk(&working).unwrap());

    assert_eq!(on_disk.content_hash, hash_model_data(working.data()));
    assert!(!on_disk.has_unsaved_changes());
    assert_eq!(engine.store().load(&on_disk.id).unwrap(), *working.data());
}

#[test]
fn exported_file_reimports_as_hash_equal_model() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("alpha.json");
    let conn = open_db_in_memory().unwrap();
    let mut engine = engine(&conn, DirectoryHost::with_save_target(&target));
    let mut working = InMemoryWorkingCopy::default();
    engine.create_model("Alpha", &mut working).unwrap();
    add_element(&mut working, "e-1");
    let exported = saved(engine.save_to_disk(&working).unwrap());

    let bytes = std::fs::read(&target).unwrap();
    let report = engine
        .import_bytes(&bytes, Some("alpha.json"), &mut working)
        .unwrap();

    match report {
        ImportReport::Loaded { model, disposition } => {
            assert_eq!(disposition, ImportDisposition::Reopened);
            assert_eq!(model.metadata.id, exported.id);
            assert_eq!(model.metadata.content_hash, exported.content_hash);
        }
        other => panic!("unexpected import report: {other:?}"),
    }
    assert_eq!(hash_model_data(working.data()), exported.content_hash);
    assert_eq!(engine.list_models().unwrap().len(), 1);
}

#[test]
fn conflicting_import_waits_for_resolution() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("alpha.json");
    let conn = open_db_in_memory().unwrap();
    let mut engine = engine(&conn, DirectoryHost::with_save_target(&target));
    let mut working = InMemoryWorkingCopy::default();
    engine.create_model("Alpha", &mut working).unwrap();
    let exported = saved(engine.save_to_disk(&working).unwrap());
    let file_bytes = std::fs::read(&target).unwrap();

    add_element(&mut working, "local");
    let local_hash = committed(engine.autosave(&working).unwrap()).content_hash;
    let local_snapshot = working.data().clone();

    let report = engine
        .import_bytes(&file_bytes, Some("alpha.json"), &mut working)
        .unwrap();
    assert!(matches!(report, ImportReport::Conflict(_)));
    assert_eq!(*working.data(), local_snapshot);
    assert_eq!(engine.session().lifecycle(), Lifecycle::Ready);
    assert_eq!(
        engine.store().stored_hash(&exported.id).unwrap(),
        Some(local_hash)
    );

    let err = engine
        .import_bytes(&file_bytes, None, &mut working)
        .unwrap_err();
    assert!(matches!(err, EngineError::ConflictPending(id) if id == exported.id));

    let resolved = engine
        .resolve_conflict(ConflictResolution::AdoptIncoming, &mut working)
        .unwrap();
    assert_eq!(resolved.metadata.content_hash, exported.content_hash);
    assert!(!resolved.metadata.has_unsaved_changes());
    assert_eq!(hash_model_data(working.data()), exported.content_hash);
    assert!(engine.pending_conflict().is_none());
    assert!(matches!(
        engine.resolve_conflict(ConflictResolution::KeepLocal, &mut working),
        Err(EngineError::NoPendingConflict)
    ));
}

#[test]
fn discarded_conflict_leaves_local_state() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("alpha.json");
    let conn = open_db_in_memory().unwrap();
    let mut engine = engine(&conn, DirectoryHost::with_save_target(&target));
    let mut working = InMemoryWorkingCopy::default();
    engine.create_model("Alpha", &mut working).unwrap();
    saved(engine.save_to_disk(&working).unwrap());
    let file_bytes = std::fs::read(&target).unwrap();
    add_element(&mut working, "local");
    let local = committed(engine.autosave(&working).unwrap());

    engine
        .import_bytes(&file_bytes, None, &mut working)
        .unwrap();
    let discarded = engine.discard_conflict().unwrap();

    assert_eq!(discarded.model_id(), &local.id);
    assert!(engine.pending_conflict().is_none());
    assert_eq!(engine.active_metadata().unwrap(), local);
}

#[test]
fn malformed_import_leaves_everything_untouched() {
    let conn = open_db_in_memory().unwrap();
    let mut engine = engine(&conn, DirectoryHost::default());
    let mut working = InMemoryWorkingCopy::default();
    engine.initialize(&mut working).unwrap();
    add_element(&mut working, "unsaved");
    let before = working.clone();

    let err = engine
        .import_bytes(b"{\"hello\": 1}", Some("x.json"), &mut working)
        .unwrap_err();

    assert!(matches!(err, EngineError::MalformedImport(_)));
    assert_eq!(err.code(), "malformed_import");
    assert_eq!(working, before);
    assert_eq!(engine.session().lifecycle(), Lifecycle::Ready);
    assert_eq!(engine.list_models().unwrap().len(), 1);
}

#[test]
fn cancelled_save_picker_is_a_silent_noop() {
    let conn = open_db_in_memory().unwrap();
    let mut engine = engine(&conn, DirectoryHost::default());
    let mut working = InMemoryWorkingCopy::default();
    engine.initialize(&mut working).unwrap();

    let outcome = engine.save_to_disk(&working).unwrap();

    assert_eq!(outcome, DiskSaveOutcome::Cancelled);
    assert!(engine.active_metadata().unwrap().last_disk_hash.is_none());
    assert!(engine.session().retained_handle().is_none());
}

#[test]
fn concurrent_disk_save_for_same_model_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let conn = open_db_in_memory().unwrap();
    let mut engine = engine(&conn, DirectoryHost::with_save_target(dir.path().join("a.json")));
    let mut working = InMemoryWorkingCopy::default();
    let id = engine
        .create_model("Alpha", &mut working)
        .unwrap()
        .metadata
        .id;

    let ticket = engine.session().disk_writes().try_acquire(&id).unwrap();
    let err = engine.save_to_disk(&working).unwrap_err();
    assert!(matches!(err, EngineError::SaveInProgress(busy) if busy == id));

    drop(ticket);
    saved(engine.save_to_disk(&working).unwrap());
    assert!(!engine.session().disk_writes().is_pending(&id));
}

#[test]
fn operations_before_initialize_are_rejected() {
    let conn = open_db_in_memory().unwrap();
    let mut engine = engine(&conn, DirectoryHost::default());
    let working = InMemoryWorkingCopy::default();

    assert!(matches!(
        engine.save_to_disk(&working),
        Err(EngineError::NotReady(Lifecycle::Uninitialized))
    ));
    assert!(matches!(
        engine.save_as("Copy", &working),
        Err(EngineError::NotReady(Lifecycle::Uninitialized))
    ));
    assert!(matches!(
        engine.has_unsaved_changes(),
        Err(EngineError::NoActiveModel)
    ));
}

#[test]
fn initialize_reopens_last_opened_model() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("data").join("modelvault.sqlite3");

    let beta_id = {
        let conn = open_db(&db_path).unwrap();
        let mut engine = engine(&conn, DirectoryHost::default());
        let mut working = InMemoryWorkingCopy::default();
        let first = engine.initialize(&mut working).unwrap();
        assert_eq!(first.metadata.name, "Untitled Model");
        assert!(matches!(
            engine.initialize(&mut working),
            Err(EngineError::AlreadyInitialized)
        ));

        let beta = engine.create_model("Beta", &mut working).unwrap();
        add_element(&mut working, "beta-1");
        committed(engine.autosave(&working).unwrap());
        beta.metadata.id
    };

    let conn = open_db(&db_path).unwrap();
    let mut engine = engine(&conn, DirectoryHost::default());
    let mut working = InMemoryWorkingCopy::default();
    let reopened = engine.initialize(&mut working).unwrap();

    assert_eq!(reopened.metadata.id, beta_id);
    assert_eq!(working.data().elements.len(), 1);
    assert_eq!(engine.list_models().unwrap().len(), 2);
}

#[test]
fn opening_unknown_model_keeps_previous_session() {
    let conn = open_db_in_memory().unwrap();
    let mut engine = engine(&conn, DirectoryHost::default());
    let mut working = InMemoryWorkingCopy::default();
    let active = engine.initialize(&mut working).unwrap().metadata.id;
    let before = working.clone();

    let err = engine
        .open_model(&ModelId::parse("m-missing").unwrap(), &mut working)
        .unwrap_err();

    assert!(matches!(err, EngineError::ModelNotFound(_)));
    assert_eq!(engine.session().lifecycle(), Lifecycle::Ready);
    assert_eq!(engine.session().active_model_id(), Some(&active));
    assert_eq!(working, before);
}

#[test]
fn save_as_forks_working_copy_into_new_model() {
    let dir = tempfile::tempdir().unwrap();
    let conn = open_db_in_memory().unwrap();
    let mut engine = engine(&conn, DirectoryHost::with_save_target(dir.path().join("a.json")));
    let mut working = InMemoryWorkingCopy::default();
    let original = engine.create_model("Alpha", &mut working).unwrap().metadata;
    engine
        .update_details(None, Some("Research notes"))
        .unwrap();
    saved(engine.save_to_disk(&working).unwrap());
    add_element(&mut working, "fork-only");

    let copy = engine.save_as("Alpha Copy", &working).unwrap();

    assert_ne!(copy.id, original.id);
    assert_eq!(copy.name, "Alpha Copy");
    assert_eq!(copy.description, "Research notes");
    assert_eq!(copy.content_hash, hash_model_data(working.data()));
    assert_eq!(engine.session().active_model_id(), Some(&copy.id));
    assert!(engine.session().retained_handle().is_none());
    assert_eq!(
        engine.registry().get(&original.id).unwrap().unwrap().content_hash,
        original.content_hash
    );
}

#[test]
fn update_details_renames_active_model() {
    let conn = open_db_in_memory().unwrap();
    let mut engine = engine(&conn, DirectoryHost::default());
    let mut working = InMemoryWorkingCopy::default();
    engine.create_model("Alpha", &mut working).unwrap();

    let renamed = engine.update_details(Some("  Gamma "), None).unwrap();
    let blank = engine.update_details(Some("   "), None).unwrap();

    assert_eq!(renamed.name, "Gamma");
    assert_eq!(blank.name, "Gamma");
    assert_eq!(engine.active_metadata().unwrap().name, "Gamma");
}

#[test]
fn opening_legacy_payload_migrates_taxonomy_in_memory() {
    let conn = open_db_in_memory().unwrap();
    let id = ModelId::parse("m-legacy").unwrap();
    let legacy: TaxonomyScheme = serde_json::from_value(serde_json::json!({
        "id": "default",
        "name": "Knowledge Graph",
        "tagColors": {"concept": "#4f86f7"},
        "relationshipLabels": ["causes"]
    }))
    .unwrap();
    let stored = ModelData {
        schemes: vec![legacy],
        ..ModelData::default()
    };
    {
        let registry = SqliteModelRegistry::try_new(&conn).unwrap();
        let store = SqliteModelStore::try_new(&conn).unwrap();
        let hash = store.save(&id, &stored).unwrap();
        registry
            .upsert(&ModelMetadata::new(id.clone(), "Legacy", hash, 1_000))
            .unwrap();
    }
    let mut engine = engine(&conn, DirectoryHost::default());
    let mut working = InMemoryWorkingCopy::default();

    let opened = engine.open_model(&id, &mut working).unwrap();

    assert!(!opened.migration_changes.is_empty());
    assert!(working.data().schemes.iter().all(|scheme| !scheme.uses_legacy_catalog()));
    assert_eq!(engine.store().load(&id).unwrap(), stored);
    let migrated = committed(engine.autosave(&working).unwrap());
    assert_eq!(migrated.content_hash, hash_model_data(working.data()));
}

#[test]
fn open_from_disk_imports_picked_file() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("shared.json");
    std::fs::write(
        &source,
        br#"{"elements":[{"id":"e-1","name":"Shared"}],"relationships":[]}"#,
    )
    .unwrap();
    let conn = open_db_in_memory().unwrap();
    let mut engine = engine(&conn, DirectoryHost::default().open_from(&source));
    let mut working = InMemoryWorkingCopy::default();
    engine.initialize(&mut working).unwrap();

    let report = engine.open_from_disk(&mut working).unwrap();

    match report {
        ImportReport::Loaded { model, disposition } => {
            assert_eq!(disposition, ImportDisposition::Registered);
            assert_eq!(model.metadata.name, "shared");
            assert!(!model.migration_changes.is_empty());
        }
        other => panic!("unexpected import report: {other:?}"),
    }
    assert_eq!(working.data().elements[0].name, "Shared");
    assert!(!working.data().schemes.is_empty());
    assert_eq!(engine.list_models().unwrap().len(), 2);
}

#[test]
fn open_from_disk_without_file_is_cancelled() {
    let conn = open_db_in_memory().unwrap();
    let mut engine = engine(&conn, DirectoryHost::default());
    let mut working = InMemoryWorkingCopy::default();
    engine.initialize(&mut working).unwrap();

    assert_eq!(
        engine.open_from_disk(&mut working).unwrap(),
        ImportReport::Cancelled
    );
}
