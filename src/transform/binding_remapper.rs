//! BindingRemapper: moves module-scope resources to new binding points
//! and overrides the access mode of storage buffers.
//!
//! Both tables are keyed by the resource's binding point in the input
//! program. Resources without an entry are copied unchanged.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::diagnostic::{Diagnostic, System};
use crate::program::{BindingPoint, CloneContext, Program, Sem};
use crate::types::{Access, AddressSpace};

use super::{Applied, ApplyResult, DataMap, Transform};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BindingRemapperConfig {
    /// Old binding point → new binding point.
    #[serde(default)]
    pub binding_points: HashMap<BindingPoint, BindingPoint>,
    /// Old binding point → access mode of the storage buffer bound there.
    #[serde(default)]
    pub access_controls: HashMap<BindingPoint, Access>,
    /// Let two resources end up sharing a binding point.
    #[serde(default)]
    pub allow_collisions: bool,
}

impl BindingRemapperConfig {
    pub fn is_empty(&self) -> bool {
        self.binding_points.is_empty() && self.access_controls.is_empty()
    }

    pub fn remap(mut self, from: BindingPoint, to: BindingPoint) -> Self {
        self.binding_points.insert(from, to);
        self
    }

    pub fn access(mut self, at: BindingPoint, access: Access) -> Self {
        self.access_controls.insert(at, access);
        self
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct BindingRemapper;

impl Transform for BindingRemapper {
    fn name(&self) -> &'static str {
        "BindingRemapper"
    }

    fn apply(&self, input: &Program, inputs: &DataMap, _outputs: &mut DataMap) -> ApplyResult<Program> {
        let Some(config) = inputs.get::<BindingRemapperConfig>() else {
            return Ok(Applied::Skip);
        };
        if config.is_empty() {
            return Ok(Applied::Skip);
        }

        let mut errors = Vec::new();
        let mut updates = Vec::new();
        let mut occupied: HashMap<BindingPoint, &str> = HashMap::new();
        for v in input.global_vars() {
            let var = input.var(v);
            let Some(old) = var.binding else {
                continue;
            };
            let binding = config.binding_points.get(&old).copied().unwrap_or(old);
            let access = match config.access_controls.get(&old) {
                Some(access) if var.space != Some(AddressSpace::Storage) => {
                    errors.push(Diagnostic::error(
                        System::Transform,
                        format!(
                            "cannot apply access control to '{}' in address space '{}'",
                            var.name,
                            var.space.unwrap_or(AddressSpace::Function).name()
                        ),
                    ));
                    *access
                }
                Some(access) => *access,
                None => var.access.unwrap_or(Access::Read),
            };
            if let Some(first) = occupied.insert(binding, &var.name) {
                if !config.allow_collisions {
                    errors.push(
                        Diagnostic::error(
                            System::Transform,
                            format!(
                                "'{}' and '{}' both use @group({}) @binding({})",
                                first, var.name, binding.group, binding.binding
                            ),
                        )
                        .with_help("set `allow_collisions` to share a binding point"),
                    );
                }
            }
            let access_changed = config.access_controls.contains_key(&old) && var.access != Some(access);
            if binding != old || access_changed {
                updates.push((v, binding, access_changed.then_some(access)));
            }
        }
        if !errors.is_empty() {
            return Err(errors);
        }
        if updates.is_empty() {
            return Ok(Applied::Skip);
        }

        let sem = Sem::analyze(input)?;
        let mut ctx = CloneContext::new(input, &sem);
        for (v, binding, access) in updates {
            ctx.update_var(v, move |var| {
                var.binding = Some(binding);
                if let Some(access) = access {
                    var.access = Some(access);
                }
            });
        }
        let (output, diagnostics) = ctx.finish();
        Ok(Applied::Changed { output, diagnostics })
    }
}
