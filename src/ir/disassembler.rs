//! Human-readable dump of an IR module.
//!
//! ```text
//! %buf:ptr<storage, S, read_write> = var @binding_point(0, 1)
//!
//! %main = @compute @workgroup_size(1, 1, 1) func():void {
//!   $B1: {
//!     %2:ptr<storage, i32, read_write> = access %buf, 0u
//!     %3:i32 = atomicAdd %2, 1i
//!     ret
//!   }
//! }
//! ```

use super::*;

pub fn disassemble(module: &Module) -> String {
    let mut d = Disassembler {
        module,
        out: String::new(),
        indent: 0,
    };
    d.root();
    for f in module.functions() {
        d.out.push('\n');
        d.function(f);
    }
    d.out
}

struct Disassembler<'a> {
    module: &'a Module,
    out: String,
    indent: usize,
}

impl Disassembler<'_> {
    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn value(&self, id: ValueId) -> String {
        match self.module.value(id) {
            Value::Constant { value, ty } => {
                if self.module.types.scalar_of(*ty) == Some(*ty) {
                    value.to_string()
                } else {
                    format!("{}({})", self.module.types.friendly_name(*ty), value)
                }
            }
            _ => match self.module.name(id) {
                Some(name) => format!("%{}", name),
                None => id.to_string(),
            },
        }
    }

    fn typed(&self, id: ValueId) -> String {
        format!(
            "{}:{}",
            self.value(id),
            self.module.types.friendly_name(self.module.type_of(id))
        )
    }

    fn root(&mut self) {
        let module = self.module;
        for id in &module.block(module.root_block()).instructions {
            let text = self.inst(*id);
            self.line(&text);
        }
    }

    fn function(&mut self, id: FunctionId) {
        let module = self.module;
        let f = module.function(id);
        let mut attrs = String::new();
        if let Some(stage) = f.stage {
            attrs.push_str(&format!("@{} ", stage.name()));
        }
        if let Some([x, y, z]) = f.workgroup_size {
            attrs.push_str(&format!("@workgroup_size({}, {}, {}) ", x, y, z));
        }
        let params: Vec<String> = f
            .params
            .iter()
            .zip(&f.param_builtins)
            .map(|(p, b)| match b {
                Some(b) => format!("{} [@{}]", self.typed(*p), b.name()),
                None => self.typed(*p),
            })
            .collect();
        let header = format!(
            "%{} = {}func({}):{} {{",
            f.name,
            attrs,
            params.join(", "),
            self.module.types.friendly_name(f.return_type)
        );
        self.line(&header);
        self.indent += 1;
        self.block(f.block);
        self.indent -= 1;
        self.line("}");
    }

    fn block(&mut self, id: BlockId) {
        self.line(&format!("{}: {{", id));
        self.indent += 1;
        let module = self.module;
        for inst in &module.block(id).instructions {
            let text = self.inst(*inst);
            self.line(&text);
            if let InstKind::If {
                true_block,
                false_block,
            } = module.inst(*inst).kind
            {
                self.indent += 1;
                self.block(true_block);
                if let Some(f) = false_block {
                    self.block(f);
                }
                self.indent -= 1;
            }
        }
        self.indent -= 1;
        self.line("}");
    }

    fn inst(&self, id: InstId) -> String {
        let inst = self.module.inst(id);
        let operands: Vec<String> = inst.operands.iter().map(|v| self.value(*v)).collect();
        let mut text = match inst.result {
            Some(r) => format!("{} = ", self.typed(r)),
            None => String::new(),
        };
        text.push_str(&match &inst.kind {
            InstKind::UserCall(f) => format!("call %{}", self.module.function(*f).name),
            InstKind::If {
                true_block,
                false_block,
            } => {
                let f = false_block.map_or("undef".to_string(), |b| b.to_string());
                format!("if [t: {}, f: {}]", true_block, f)
            }
            kind => kind.name(),
        });
        if !operands.is_empty() {
            text.push(' ');
            text.push_str(&operands.join(", "));
        }
        if let InstKind::Var { binding: Some(b) } = inst.kind {
            text.push_str(&format!(" @binding_point({}, {})", b.group, b.binding));
        }
        text
    }
}
