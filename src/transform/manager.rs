//! Manager: runs an ordered list of transforms.
//!
//! Each transform sees the output of the ones before it. A transform that
//! skips leaves the program and the data map untouched, and whatever it
//! wrote to its output map is dropped. A `Changed` result replaces the
//! program and merges the outputs into the map later transforms read.

use crate::diagnostic::{Diagnostic, Severity, System};

use super::{Applied, DataMap, Fingerprint, Transform};

/// Result of a full pipeline run.
#[derive(Debug)]
pub struct PipelineOutput<P> {
    pub program: P,
    /// The input data plus every fact written by a transform that changed the program.
    pub data: DataMap,
    /// Non-fatal diagnostics from every stage, in order.
    pub diagnostics: Vec<Diagnostic>,
    /// Names of the transforms that changed the program.
    pub changed: Vec<&'static str>,
}

pub struct Manager<P> {
    transforms: Vec<Box<dyn Transform<P>>>,
}

impl<P> Default for Manager<P> {
    fn default() -> Self {
        Self {
            transforms: Vec::new(),
        }
    }
}

impl<P: Fingerprint> Manager<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transform to run after every transform added before it.
    pub fn add<T: Transform<P> + 'static>(&mut self, transform: T) -> &mut Self {
        self.transforms.push(Box::new(transform));
        self
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.transforms.iter().map(|t| t.name()).collect()
    }

    /// Run every transform in order.
    ///
    /// A transform error, or an internal error among a transform's
    /// diagnostics, aborts the run: the partial result is discarded and
    /// every diagnostic gathered so far is returned.
    pub fn run(&self, program: P, data: DataMap) -> Result<PipelineOutput<P>, Vec<Diagnostic>> {
        let mut program = program;
        let mut data = data;
        let mut diagnostics = Vec::new();
        let mut changed = Vec::new();

        for transform in &self.transforms {
            let mut outputs = DataMap::new();
            let applied = match transform.apply(&program, &data, &mut outputs) {
                Ok(applied) => applied,
                Err(errors) => {
                    diagnostics.extend(errors);
                    return Err(diagnostics);
                }
            };
            match applied {
                Applied::Skip => {}
                Applied::Changed {
                    output,
                    diagnostics: stage,
                } => {
                    let fatal = stage.iter().any(|d| d.severity == Severity::InternalError);
                    diagnostics.extend(stage);
                    if fatal {
                        return Err(diagnostics);
                    }
                    if output.fingerprint() == program.fingerprint() {
                        diagnostics.push(
                            Diagnostic::warning(
                                System::Transform,
                                format!("{} reported a change but produced an identical program", transform.name()),
                            )
                            .with_help("a transform with nothing to do should return Skip"),
                        );
                    }
                    program = output;
                    data.merge(outputs);
                    changed.push(transform.name());
                }
            }
        }

        Ok(PipelineOutput {
            program,
            data,
            diagnostics,
            changed,
        })
    }
}
