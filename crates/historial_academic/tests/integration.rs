//! Integration tests for the student repository and registry.

use historial_academic::rehydrate::flatten;
use historial_academic::{
    AcademicError, Credential, ProfileEdit, RecordsConfig, Registry, Student, StudentRepository,
    StudentStatus, SubjectRecord,
};
use historial_codec::Value;
use historial_core::{Config, ConnectionManager, CoreError, Factory, RecordStore};
use historial_storage::InMemoryBackend;
use std::rc::Rc;

fn repository(factory: Factory) -> StudentRepository {
    StudentRepository::new(factory, &RecordsConfig::default())
}

fn ana() -> Student {
    let mut student = Student::new("123", "Ana", "2001-04-02", "AR");
    student.activate();
    student
}

#[tokio::test]
async fn saved_student_loads_with_empty_nested_sequences() {
    let repository = repository(Factory::in_memory());
    repository.save(&ana()).await.unwrap();

    let students = repository.load_all().await;
    assert_eq!(students.len(), 1);
    assert_eq!(students[0].id, "123");
    assert_eq!(students[0].status, StudentStatus::Active);
    assert!(students[0].records.is_empty());
    assert!(students[0].credentials.is_empty());
}

#[tokio::test]
async fn nested_record_and_credential_survive_storage() {
    let repository = repository(Factory::in_memory());
    let mut student = ana();
    student.add_record(SubjectRecord::new("Math", 8.0, true));
    student.add_credential(Credential::new("Cert", "2024-01-01", None));
    repository.save(&student).await.unwrap();

    let loaded = repository.find("123").await.unwrap().unwrap();
    assert_eq!(loaded.records.len(), 1);
    assert_eq!(loaded.records[0].score, 8.0);
    assert!(loaded.records[0].passed);
    assert_eq!(loaded.credentials[0].note, None);
    assert_eq!(loaded, student);
}

#[tokio::test]
async fn text_pass_flag_from_storage_is_normalized() {
    let factory = Factory::in_memory();
    let repository = repository(factory);
    let drifted = Value::map([
        ("id", Value::from("9")),
        ("name", Value::from("Luis")),
        ("status", Value::from("inactive")),
        (
            "records",
            Value::Array(vec![Value::map([
                ("name", Value::from("Math")),
                ("score", Value::from(4)),
                ("passed", Value::from("false")),
            ])]),
        ),
    ]);
    repository.store().put(drifted).await.unwrap();

    let loaded = repository.find("9").await.unwrap().unwrap();
    assert!(!loaded.records[0].passed);
    assert_eq!(loaded.records[0].score, 4.0);
}

#[tokio::test]
async fn open_failure_loads_as_empty() {
    let factory = Factory::in_memory();
    let manager = ConnectionManager::new(factory, "academic_records", 1, |_| {
        Err(CoreError::upgrade_failed("disk says no"))
    });
    let repository = StudentRepository::from_store(RecordStore::new(Rc::new(manager), "students"));

    assert!(repository.load_all().await.is_empty());
    assert!(matches!(
        repository.save(&ana()).await,
        Err(AcademicError::Core(CoreError::UpgradeFailed { .. }))
    ));
}

#[tokio::test]
async fn version_mismatch_loads_as_empty() {
    let factory = Factory::in_memory();
    let newer = StudentRepository::new(factory.clone(), &RecordsConfig::new().version(2));
    newer.save(&ana()).await.unwrap();

    let older = repository(factory);
    assert!(older.load_all().await.is_empty());
}

#[tokio::test]
async fn integer_ids_and_odd_fields_rehydrate_leniently() {
    let factory = Factory::in_memory();
    let repository = repository(factory);
    repository.save(&ana()).await.unwrap();

    let tx = repository
        .store()
        .begin(historial_core::TransactionMode::ReadWrite)
        .await
        .unwrap();
    tx.store()
        .unwrap()
        .put(Value::map([
            ("id", Value::from(7)),
            ("name", Value::Bool(true)),
            ("records", Value::from("not an array")),
        ]))
        .await
        .unwrap();
    tx.done().await.unwrap();

    let students = repository.load_all().await;
    assert_eq!(students.len(), 2);
    let odd = students.iter().find(|s| s.id == "7").unwrap();
    assert_eq!(odd.name, "");
    assert!(odd.records.is_empty());
    assert_eq!(repository.count().await.unwrap(), 2);
}

#[tokio::test]
async fn integer_keyed_student_keeps_one_record_when_resaved() {
    let repository = repository(Factory::in_memory());
    repository
        .store()
        .put(Value::map([
            ("id", Value::from(5)),
            ("name", Value::from("Eva")),
            ("status", Value::from("active")),
        ]))
        .await
        .unwrap();

    let found = repository.find("5").await.unwrap().unwrap();
    assert_eq!(found.name, "Eva");

    let loaded = repository.load_all().await;
    assert_eq!(loaded.len(), 1);
    repository.save(&loaded[0]).await.unwrap();

    let reloaded = repository.load_all().await;
    assert_eq!(
        reloaded.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(),
        vec!["5"]
    );
    assert_eq!(repository.count().await.unwrap(), 1);

    repository.store().put(Value::map([("id", Value::from(6))])).await.unwrap();
    repository.delete("6").await.unwrap();
    assert!(repository.find("6").await.unwrap().is_none());
    assert_eq!(repository.count().await.unwrap(), 1);
}

#[tokio::test]
async fn save_all_is_one_transaction() {
    let factory = Factory::in_memory();
    let repository = repository(factory.clone());
    let students = vec![ana(), Student::new("456", "Luis", "2000-01-01", "UY")];
    assert_eq!(repository.count().await.unwrap(), 0);
    let before = factory.stats().transactions_committed;

    repository.save_all(&students).await.unwrap();
    assert_eq!(factory.stats().transactions_committed, before + 1);
    assert_eq!(repository.load_all().await, students);
}

#[tokio::test]
async fn delete_unknown_student_succeeds() {
    let repository = repository(Factory::in_memory());
    repository.delete("nobody").await.unwrap();
    repository.save(&ana()).await.unwrap();
    repository.delete("123").await.unwrap();
    repository.delete("123").await.unwrap();
    assert!(repository.find("123").await.unwrap().is_none());
}

#[tokio::test]
async fn students_persist_across_factories() {
    let backend = InMemoryBackend::new();
    {
        let factory = Factory::open(backend.clone(), Config::default()).unwrap();
        let mut registry = Registry::load(repository(factory)).await;
        registry
            .register(Student::new("123", "Ana", "2001-04-02", "AR"))
            .await
            .unwrap();
        registry.select("123").unwrap();
        registry.grade("Math", 9.5).await.unwrap();
    }

    let factory = Factory::open(backend, Config::default()).unwrap();
    let registry = Registry::load(repository(factory)).await;
    let view = registry.student_view("123").unwrap();
    assert_eq!(view.status, StudentStatus::Active);
    assert_eq!(view.records.len(), 1);
    assert_eq!(view.average, 9.5);
}

#[tokio::test]
async fn registration_rejects_duplicate_ids() {
    let mut registry = Registry::load(repository(Factory::in_memory())).await;
    registry.register(ana()).await.unwrap();

    let err = registry
        .register(Student::new("123", "Other", "", ""))
        .await
        .unwrap_err();
    assert!(matches!(err, AcademicError::DuplicateId { ref id } if id == "123"));
    assert_eq!(registry.students().len(), 1);
}

#[tokio::test]
async fn editing_the_id_replaces_the_stored_record() {
    let mut registry = Registry::load(repository(Factory::in_memory())).await;
    registry.register(ana()).await.unwrap();
    registry
        .register(Student::new("456", "Luis", "", ""))
        .await
        .unwrap();
    registry.select("123").unwrap();

    let clash = ProfileEdit {
        id: Some("456".to_string()),
        ..ProfileEdit::default()
    };
    assert!(matches!(
        registry.edit_profile("123", clash).await,
        Err(AcademicError::DuplicateId { .. })
    ));

    let edit = ProfileEdit {
        id: Some("789".to_string()),
        name: Some("Ana María".to_string()),
        status: Some(StudentStatus::Inactive),
        ..ProfileEdit::default()
    };
    registry.edit_profile("123", edit).await.unwrap();

    let repository = registry.repository();
    assert!(repository.find("123").await.unwrap().is_none());
    let renamed = repository.find("789").await.unwrap().unwrap();
    assert_eq!(renamed.name, "Ana María");
    assert_eq!(renamed.status, StudentStatus::Inactive);
    assert_eq!(repository.count().await.unwrap(), 2);
    assert_eq!(registry.selected().map(|s| s.id.as_str()), Some("789"));
}

#[tokio::test]
async fn grading_derives_and_edit_score_rederives_pass_flag() {
    let mut registry = Registry::load(repository(Factory::in_memory())).await;
    registry.register(ana()).await.unwrap();

    assert!(matches!(
        registry.grade("Math", 7.0).await,
        Err(AcademicError::NoSelection)
    ));
    registry.select("123").unwrap();
    registry.grade("Math", 5.0).await.unwrap();
    registry
        .add_record(SubjectRecord::new("Art", 3.0, true))
        .await
        .unwrap();

    let student = registry.selected().unwrap();
    assert!(!student.records[0].passed);
    assert!(student.records[1].passed);

    registry.edit_score(0, 6.0).await.unwrap();
    registry.edit_score(1, 3.0).await.unwrap();
    assert!(matches!(
        registry.edit_score(5, 9.0).await,
        Err(AcademicError::RecordIndex { index: 5, len: 2 })
    ));
    assert!(matches!(
        registry.grade("Music", f64::NAN).await,
        Err(AcademicError::InvalidScore { .. })
    ));

    let stored = registry.repository().find("123").await.unwrap().unwrap();
    assert!(stored.records[0].passed);
    assert!(!stored.records[1].passed);
    assert_eq!(stored.average(), 4.5);
}

#[tokio::test]
async fn removing_clears_selection_and_storage() {
    let mut registry = Registry::load(repository(Factory::in_memory())).await;
    registry.register(ana()).await.unwrap();
    registry.select("123").unwrap();
    registry
        .add_credential(Credential::new("Bachelor", "2023-12-01", Some("cum laude".into())))
        .await
        .unwrap();

    let removed = registry.remove("123").await.unwrap();
    assert_eq!(removed.credentials.len(), 1);
    assert!(registry.selected().is_none());
    assert!(registry.students().is_empty());
    assert!(registry.repository().load_all().await.is_empty());
    assert!(matches!(
        registry.remove("123").await,
        Err(AcademicError::UnknownStudent { .. })
    ));
}

#[tokio::test]
async fn failed_save_keeps_in_memory_change() {
    let backend = InMemoryBackend::new();
    let factory = Factory::open(backend.clone(), Config::default()).unwrap();
    let mut registry = Registry::load(repository(factory)).await;
    registry.register(ana()).await.unwrap();

    backend.set_read_only(true);
    registry
        .set_status("123", StudentStatus::Inactive)
        .await
        .unwrap();
    assert_eq!(
        registry.student("123").map(|s| s.status),
        Some(StudentStatus::Inactive)
    );

    backend.set_read_only(false);
    registry.reload().await;
    assert_eq!(
        registry.student("123").map(|s| s.status),
        Some(StudentStatus::Active)
    );
}

#[tokio::test]
async fn views_report_derived_figures() {
    let mut registry = Registry::load(repository(Factory::in_memory())).await;
    registry.register(ana()).await.unwrap();
    registry
        .register(Student::new("456", "Luis", "", ""))
        .await
        .unwrap();
    registry.select("123").unwrap();
    registry.grade("Math", 8.0).await.unwrap();
    registry.grade("History", 4.0).await.unwrap();
    registry.grade("Art", 7.0).await.unwrap();

    let overview = registry.instructor_overview();
    assert_eq!(overview.len(), 2);
    assert_eq!(overview[0].id, "123");
    assert_eq!(overview[0].average, 6.33);
    assert_eq!((overview[0].passed, overview[0].failed), (2, 1));
    assert_eq!(overview[1].average, 0.0);

    let view = registry.student_view("456").unwrap();
    assert!(view.records.is_empty());
    assert!(registry.student_view("nobody").is_err());
}

#[tokio::test]
async fn stored_record_layout_matches_flatten() {
    let repository = repository(Factory::in_memory());
    let mut student = ana();
    student.add_record(SubjectRecord::graded("Math", 8.0));
    repository.save(&student).await.unwrap();

    let stored = repository.store().get("123").await.unwrap().unwrap();
    assert_eq!(stored, flatten(&student));
    assert_eq!(stored.get("status"), Some(&Value::from("active")));
}
