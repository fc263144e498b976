use eoscope_core::config::AnalysisConfig;
use eoscope_core::error::EoError;
use eoscope_core::iterate::Strategy;
use eoscope_core::reference::ReferenceKind;
use eoscope_core::registry::{TaskDescriptor, TaskRegistry};
use eoscope_core::task::TaskCategory;
use eoscope_core::tasks::{SuperbiasConfig, SuperbiasTask};

fn descriptor(name: &'static str) -> TaskDescriptor {
    TaskDescriptor {
        name,
        category: TaskCategory::Slot,
        strategy: Strategy::BySlot,
        config_type: "SuperbiasConfig",
        description: "test task, with \"quotes\"",
        build: |cfg| Box::new(SuperbiasTask::new(SuperbiasConfig { base: cfg.clone() })),
    }
}

#[test]
fn test_builtin_registration_order() {
    let registry = TaskRegistry::with_builtin_tasks().unwrap();
    assert_eq!(
        registry.list_names(),
        vec![
            "Superbias",
            "Superdark",
            "BiasVRow",
            "BiasFft",
            "FlatPair",
            "SuperbiasStats",
            "SuperbiasStability",
            "SuperbiasSummary",
            "SuperdarkStability",
        ]
    );
}

#[test]
fn test_superdark_stability_is_a_slot_summary() {
    let registry = TaskRegistry::with_builtin_tasks().unwrap();
    let descriptor = registry.get("SuperdarkStability").unwrap();
    assert_eq!(descriptor.strategy, Strategy::SummaryBySlot);
    assert_eq!(descriptor.category, TaskCategory::Summary);
    let task = registry.build("SuperdarkStability", &AnalysisConfig::default()).unwrap();
    assert_eq!(task.reference_kind(), ReferenceKind::Superdark);
    let superbias = registry.build("SuperbiasStability", &AnalysisConfig::default()).unwrap();
    assert_eq!(superbias.reference_kind(), ReferenceKind::Superbias);
}

#[test]
fn test_duplicate_name() {
    let mut registry = TaskRegistry::new();
    registry.register(descriptor("A")).unwrap();
    let err = registry.register(descriptor("A")).unwrap_err();
    assert!(matches!(err, EoError::DuplicateName(ref n) if n == "A"));
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_unknown_task() {
    let registry = TaskRegistry::with_builtin_tasks().unwrap();
    assert!(matches!(registry.get("Nope"), Err(EoError::UnknownTask(_))));
    assert!(registry.build("Nope", &AnalysisConfig::default()).is_err());
}

#[test]
fn test_build_uses_config() {
    let registry = TaskRegistry::with_builtin_tasks().unwrap();
    let cfg = AnalysisConfig {
        outdir: "elsewhere".into(),
        ..AnalysisConfig::default()
    };
    let task = registry.build("SuperbiasSummary", &cfg).unwrap();
    assert_eq!(task.name(), "SuperbiasSummary");
    assert_eq!(task.category(), TaskCategory::Summary);
    assert_eq!(task.strategy(), Strategy::Summary);
    assert_eq!(task.config().outdir, cfg.outdir);
    assert_eq!(task.upstream().unwrap().name(), "SuperbiasStats");
}

#[test]
fn test_descriptors_match_tasks() {
    let registry = TaskRegistry::with_builtin_tasks().unwrap();
    let cfg = AnalysisConfig::default();
    for d in registry.descriptors() {
        let task = (d.build)(&cfg);
        assert_eq!(task.name(), d.name);
        assert_eq!(task.category(), d.category);
        assert_eq!(task.strategy(), d.strategy);
    }
}

#[test]
fn test_describe_csv_quotes_fields() {
    let mut registry = TaskRegistry::new();
    registry.register(descriptor("A")).unwrap();
    let csv = registry.describe_csv().unwrap();
    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some("name,category,strategy,config,description"));
    assert_eq!(
        lines.next(),
        Some(r#"A,slot,by-slot,SuperbiasConfig,"test task, with ""quotes""""#)
    );

    let mut reader = csv::Reader::from_reader(csv.as_bytes());
    let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(records.len(), 1);
    assert_eq!(&records[0][4], "test task, with \"quotes\"");
}

#[test]
fn test_describe_csv_one_record_per_builtin() {
    let registry = TaskRegistry::with_builtin_tasks().unwrap();
    let csv = registry.describe_csv().unwrap();
    let mut reader = csv::Reader::from_reader(csv.as_bytes());
    let names: Vec<String> = reader
        .records()
        .map(|r| r.unwrap()[0].to_string())
        .collect();
    assert_eq!(names, registry.list_names());
}

#[test]
fn test_describe_markdown() {
    let registry = TaskRegistry::with_builtin_tasks().unwrap();
    let md = registry.describe_markdown();
    assert!(md.starts_with("| Name |"));
    assert_eq!(md.lines().count(), 2 + registry.len());
    assert!(md.contains("| FlatPair | slot | by-slot | FlatPairConfig |"));
}
