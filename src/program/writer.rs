//! WGSL printer for programs.
//!
//! Produces canonical text for a `Program`: tests compare against it and
//! the transform manager fingerprints it. Binary expressions are always
//! parenthesized so the output never depends on precedence.

use crate::types::AddressSpace;

use super::*;

pub fn to_wgsl(program: &Program) -> String {
    let mut w = WgslWriter {
        program,
        out: String::new(),
        indent: 0,
    };
    for (i, decl) in program.globals().iter().enumerate() {
        if i > 0 {
            w.out.push('\n');
        }
        match *decl {
            GlobalDecl::Struct(ty) => w.structure(ty),
            GlobalDecl::Var(v) => {
                let text = w.var_decl(v);
                w.line(&text);
            }
            GlobalDecl::Function(f) => w.function(f),
        }
    }
    w.out
}

struct WgslWriter<'a> {
    program: &'a Program,
    out: String,
    indent: usize,
}

impl WgslWriter<'_> {
    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn ty(&self, ty: TypeId) -> String {
        self.program.types.friendly_name(ty)
    }

    fn structure(&mut self, ty: TypeId) {
        let Some(s) = self.program.types.as_struct(ty) else {
            return;
        };
        let members: Vec<String> = s
            .members
            .iter()
            .map(|m| format!("{} : {},", m.name, self.ty(m.ty)))
            .collect();
        self.line(&format!("struct {} {{", s.name));
        self.indent += 1;
        for m in &members {
            self.line(m);
        }
        self.indent -= 1;
        self.line("}");
    }

    fn var_decl(&self, id: VarId) -> String {
        let var = self.program.var(id);
        let mut text = String::new();
        if let Some(b) = var.binding {
            text.push_str(&format!("@group({}) @binding({}) ", b.group, b.binding));
        }
        let keyword = match var.kind {
            VarKind::Var => match (var.space, var.access) {
                (Some(AddressSpace::Function) | None, _) | (Some(AddressSpace::Handle), _) => {
                    "var".to_string()
                }
                (Some(space), Some(access)) => format!("var<{}, {}>", space.name(), access.name()),
                (Some(space), None) => format!("var<{}>", space.name()),
            },
            VarKind::Let | VarKind::Param => "let".to_string(),
            VarKind::Const => "const".to_string(),
        };
        text.push_str(&keyword);
        text.push(' ');
        text.push_str(&var.name);
        if let Some(ty) = var.ty {
            text.push_str(" : ");
            text.push_str(&self.ty(ty));
        }
        if let Some(init) = var.initializer {
            text.push_str(" = ");
            text.push_str(&self.expr(init));
        }
        text.push(';');
        text
    }

    fn function(&mut self, id: FnId) {
        let f = self.program.function(id);
        for attr in &f.attributes {
            let text = match attr {
                Attribute::Stage(stage) => format!("@{}", stage.name()),
                Attribute::WorkgroupSize(x, y, z) => format!("@workgroup_size({}, {}, {})", x, y, z),
                Attribute::AtomicStub(b) => format!("@internal(spirv-atomic {})", b.name()),
            };
            self.line(&text);
        }
        let params: Vec<String> = f
            .params
            .iter()
            .map(|p| {
                let var = self.program.var(*p);
                let ty = var.ty.map(|t| self.ty(t)).unwrap_or_default();
                match var.builtin {
                    Some(b) => format!("@builtin({}) {} : {}", b.name(), var.name, ty),
                    None => format!("{} : {}", var.name, ty),
                }
            })
            .collect();
        let ret = match self.program.types[f.return_type] {
            crate::types::Type::Void => String::new(),
            _ => format!(" -> {}", self.ty(f.return_type)),
        };
        self.line(&format!("fn {}({}){} {{", f.name, params.join(", "), ret));
        self.indent += 1;
        for s in &f.body {
            self.stmt(*s);
        }
        self.indent -= 1;
        self.line("}");
    }

    fn stmt(&mut self, id: StmtId) {
        match self.program.stmt(id) {
            Stmt::Decl(v) => {
                let text = self.var_decl(*v);
                self.line(&text);
            }
            Stmt::Assign { lhs, rhs } => {
                let text = format!("{} = {};", self.expr(*lhs), self.expr(*rhs));
                self.line(&text);
            }
            Stmt::Call(e) => {
                let text = format!("{};", self.expr(*e));
                self.line(&text);
            }
            Stmt::Return(None) => self.line("return;"),
            Stmt::Return(Some(v)) => {
                let text = format!("return {};", self.expr(*v));
                self.line(&text);
            }
            Stmt::Block(stmts) => {
                self.line("{");
                self.indent += 1;
                for s in stmts {
                    self.stmt(*s);
                }
                self.indent -= 1;
                self.line("}");
            }
        }
    }

    fn expr(&self, id: ExprId) -> String {
        match self.program.expr(id) {
            Expr::Literal(lit) => literal(*lit),
            Expr::Ident(v) => self.program.var(*v).name.clone(),
            Expr::Member { object, member } => format!("{}.{}", self.postfix_object(*object), member),
            Expr::Index { object, index } => {
                format!("{}[{}]", self.postfix_object(*object), self.expr(*index))
            }
            Expr::Unary { op, expr } => {
                let token = match op {
                    UnaryOp::AddressOf => "&",
                    UnaryOp::Indirection => "*",
                    UnaryOp::Negation => "-",
                    UnaryOp::Complement => "~",
                    UnaryOp::Not => "!",
                };
                format!("{}{}", token, self.expr(*expr))
            }
            Expr::Binary { op, lhs, rhs } => {
                format!("({} {} {})", self.expr(*lhs), op.token(), self.expr(*rhs))
            }
            Expr::Call { target, args } => {
                let name = match target {
                    CallTarget::Function(f) => self.program.function(*f).name.as_str(),
                    CallTarget::Builtin(b) => b.name(),
                };
                let args: Vec<String> = args.iter().map(|a| self.expr(*a)).collect();
                format!("{}({})", name, args.join(", "))
            }
        }
    }

    /// Unary operators bind looser than postfix accessors.
    fn postfix_object(&self, object: ExprId) -> String {
        match self.program.expr(object) {
            Expr::Unary { .. } => format!("({})", self.expr(object)),
            _ => self.expr(object),
        }
    }
}

fn literal(lit: Literal) -> String {
    match lit {
        Literal::Bool(b) => b.to_string(),
        Literal::I32(v) => format!("{}i", v),
        Literal::U32(v) => format!("{}u", v),
        Literal::F32(v) => format!("{:?}f", v),
        Literal::F16(v) => format!("{:?}h", v),
    }
}
