//! ShiftMask: gives shifts WGSL semantics on backends that leave
//! over-wide shifts undefined.
//!
//! WGSL only uses the low `log2(bit_width)` bits of a shift amount. C-like
//! targets shifting by the bit width or more are undefined, so every shift
//! whose amount is not a constant already in range gets `& (bit_width - 1)`.

use crate::ir::clone::CloneContext;
use crate::ir::{BinaryKind, Constant, InstId, InstKind, Module, ValueId};

use super::{Applied, ApplyResult, DataMap, Transform};

#[derive(Clone, Copy, Debug, Default)]
pub struct ShiftMask;

impl Transform<Module> for ShiftMask {
    fn name(&self) -> &'static str {
        "ShiftMask"
    }

    fn apply(&self, input: &Module, _inputs: &DataMap, _outputs: &mut DataMap) -> ApplyResult<Module> {
        let mut shifts: Vec<(InstId, BinaryKind, u32)> = Vec::new();
        for f in input.functions() {
            input.walk_block(input.function(f).block, &mut |inst| {
                let InstKind::Binary(kind) = inst.kind else {
                    return;
                };
                if !kind.is_shift() {
                    return;
                }
                let Some(width) = input.types.bit_width(input.type_of(inst.operands[0])) else {
                    return;
                };
                if in_range(input, inst.operands[1], width) {
                    return;
                }
                if let Some(id) = inst.result.and_then(|r| input.defining_inst(r)) {
                    shifts.push((id, kind, width));
                }
            });
        }
        if shifts.is_empty() {
            return Ok(Applied::Skip);
        }

        let mut ctx = CloneContext::new(input);
        for (inst, kind, width) in shifts {
            ctx.substitute(inst, move |ctx, block, ops| {
                let amount = ops[1];
                let amount_ty = ctx.dst.module().type_of(amount);
                let mask = Constant::U32(width - 1);
                let mask = if ctx.dst.types().scalar_of(amount_ty) == Some(amount_ty) {
                    ctx.dst.constant(mask)
                } else {
                    ctx.dst.splat(mask, amount_ty)?
                };
                let masked = ctx.dst.binary(block, BinaryKind::And, amount, mask)?;
                ctx.dst.binary(block, kind, ops[0], masked).map(Some)
            });
        }
        let output = ctx.finish()?;
        Ok(Applied::changed(output))
    }
}

/// True if `amount` is a constant below `width`, or already masked by one.
fn in_range(module: &Module, amount: ValueId, width: u32) -> bool {
    let below = |v: ValueId| {
        module
            .value(v)
            .as_constant()
            .and_then(|c| c.as_u64())
            .is_some_and(|c| c < u64::from(width))
    };
    if below(amount) {
        return true;
    }
    module
        .defining_inst(amount)
        .map(|i| module.inst(i))
        .is_some_and(|inst| inst.kind == InstKind::Binary(BinaryKind::And) && below(inst.operands[1]))
}
