use super::*;
use crate::diagnostic::{Severity, System};
use crate::program::{CloneContext, ProgramBuilder, Sem};
use crate::types::AddressSpace;

#[derive(Debug, PartialEq)]
struct Marker(u32);

#[derive(Debug, PartialEq)]
struct Seen(Option<u32>);

fn empty() -> Program {
    ProgramBuilder::new().build()
}

/// Adds a private `i32` global named after `name`; records which `Marker` it saw.
struct AddGlobal {
    name: &'static str,
    writes: Option<u32>,
}

impl Transform for AddGlobal {
    fn name(&self) -> &'static str {
        self.name
    }

    fn apply(&self, input: &Program, inputs: &DataMap, outputs: &mut DataMap) -> ApplyResult<Program> {
        let sem = Sem::analyze(input)?;
        let mut ctx = CloneContext::new(input, &sem);
        let i = ctx.dst.types().i32();
        let name = ctx.dst.symbols().fresh(self.name);
        ctx.dst.global_var(name, AddressSpace::Private, i, None);
        if let Some(m) = self.writes {
            outputs.add(Marker(m));
        }
        outputs.add(Seen(inputs.get::<Marker>().map(|m| m.0)));
        let (output, diagnostics) = ctx.finish();
        Ok(Applied::Changed { output, diagnostics })
    }
}

/// Always skips, but scribbles into its outputs first.
struct SkipWithOutput;

impl Transform for SkipWithOutput {
    fn name(&self) -> &'static str {
        "SkipWithOutput"
    }

    fn apply(&self, _input: &Program, _inputs: &DataMap, outputs: &mut DataMap) -> ApplyResult<Program> {
        outputs.add(Marker(99));
        Ok(Applied::Skip)
    }
}

/// Returns an identical copy instead of skipping.
struct NeedlessCopy;

impl Transform for NeedlessCopy {
    fn name(&self) -> &'static str {
        "NeedlessCopy"
    }

    fn apply(&self, input: &Program, _inputs: &DataMap, _outputs: &mut DataMap) -> ApplyResult<Program> {
        Ok(Applied::changed(input.clone()))
    }
}

struct Fails(Severity);

impl Transform for Fails {
    fn name(&self) -> &'static str {
        "Fails"
    }

    fn apply(&self, input: &Program, _inputs: &DataMap, _outputs: &mut DataMap) -> ApplyResult<Program> {
        match self.0 {
            Severity::Error => Err(vec![Diagnostic::error(System::Transform, "cannot salvage input")]),
            severity => Ok(Applied::Changed {
                output: input.clone(),
                diagnostics: vec![Diagnostic {
                    severity,
                    ..Diagnostic::error(System::Transform, "broken invariant")
                }],
            }),
        }
    }
}

// ── DataMap ──

#[test]
fn test_data_map_one_value_per_type() {
    let mut data = DataMap::new();
    data.add(Marker(1));
    data.add(Seen(None));
    data.add(Marker(2));
    assert_eq!(data.len(), 2);
    assert_eq!(data.get::<Marker>(), Some(&Marker(2)));
    assert_eq!(data.keys().collect::<Vec<_>>(), vec!["Marker", "Seen"]);
}

#[test]
fn test_data_map_take_and_require() {
    let mut data = DataMap::new().with(Marker(7));
    assert!(data.require::<Marker>("Test").is_ok());
    let err = data.require::<Seen>("Test").unwrap_err();
    assert_eq!(err.message, "missing Seen for Test");
    assert_eq!(data.take::<Marker>(), Some(Marker(7)));
    assert!(data.is_empty());
    assert!(data.take::<Marker>().is_none());
}

#[test]
fn test_data_map_merge_prefers_incoming() {
    let mut data = DataMap::new().with(Marker(1));
    data.merge(DataMap::new().with(Marker(2)).with(Seen(Some(3))));
    assert_eq!(data.get::<Marker>(), Some(&Marker(2)));
    assert_eq!(data.get::<Seen>(), Some(&Seen(Some(3))));
}

// ── Manager ──

#[test]
fn test_manager_runs_in_order_and_shares_outputs() {
    let mut manager = Manager::<Program>::new();
    manager
        .add(AddGlobal {
            name: "first",
            writes: Some(5),
        })
        .add(AddGlobal {
            name: "second",
            writes: None,
        });
    assert_eq!(manager.names(), vec!["first", "second"]);
    let out = manager.run(empty(), DataMap::new()).unwrap();
    assert_eq!(out.changed, vec!["first", "second"]);
    assert_eq!(out.data.get::<Seen>(), Some(&Seen(Some(5))));
    assert!(out.program.find_global_var("first").is_some());
    assert!(out.program.find_global_var("second").is_some());
    assert!(out.diagnostics.is_empty());
}

#[test]
fn test_manager_drops_outputs_of_skipped_transforms() {
    let mut manager = Manager::<Program>::new();
    manager.add(SkipWithOutput).add(AddGlobal {
        name: "g",
        writes: None,
    });
    let out = manager.run(empty(), DataMap::new()).unwrap();
    assert_eq!(out.data.get::<Seen>(), Some(&Seen(None)));
    assert!(!out.data.contains::<Marker>());
    assert_eq!(out.changed, vec!["g"]);
}

#[test]
fn test_manager_warns_on_identical_change() {
    let mut manager = Manager::<Program>::new();
    manager.add(NeedlessCopy);
    let out = manager.run(empty(), DataMap::new()).unwrap();
    assert_eq!(out.diagnostics.len(), 1);
    assert_eq!(out.diagnostics[0].severity, Severity::Warning);
    assert!(out.diagnostics[0].message.starts_with("NeedlessCopy"));
}

#[test]
fn test_manager_aborts_on_fatal() {
    for severity in [Severity::Error, Severity::InternalError] {
        let mut manager = Manager::<Program>::new();
        manager.add(Fails(severity)).add(AddGlobal {
            name: "never",
            writes: None,
        });
        let errors = manager.run(empty(), DataMap::new()).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].severity, severity);
    }
}

#[test]
fn test_manager_keeps_non_fatal_errors() {
    let mut manager = Manager::<Program>::new();
    manager.add(Fails(Severity::Warning)).add(AddGlobal {
        name: "after",
        writes: None,
    });
    let out = manager.run(empty(), DataMap::new()).unwrap();
    assert!(out.program.find_global_var("after").is_some());
    assert!(out.diagnostics.iter().any(|d| d.message == "broken invariant"));
}

#[test]
fn test_should_run() {
    assert!(!should_run(&SkipWithOutput, &empty(), &DataMap::new()));
    assert!(should_run(&NeedlessCopy, &empty(), &DataMap::new()));
}

#[test]
fn test_fingerprint_tracks_content() {
    let a = empty();
    let mut b = ProgramBuilder::new();
    let i = b.types().i32();
    b.global_var("x", AddressSpace::Private, i, None);
    let b = b.build();
    assert_eq!(a.fingerprint(), empty().fingerprint());
    assert_ne!(a.fingerprint(), b.fingerprint());
}
