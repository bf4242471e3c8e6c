//! The small slice of Java the synthesizer emits, and its rendering.

use std::collections::{BTreeSet, HashMap};

use crate::types::Type;

#[derive(Clone, Debug, PartialEq)]
pub enum CallTarget {
    Static(Type),
    Receiver(Box<Expr>),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Var(String),
    Literal(String),
    New {
        ty: Type,
        args: Vec<Expr>,
        /// Checked exceptions declared by the constructor.
        throws: Vec<String>,
    },
    Call {
        target: CallTarget,
        method: String,
        args: Vec<Expr>,
        throws: Vec<String>,
    },
    Assign {
        name: String,
        value: Box<Expr>,
    },
    Paren(Box<Expr>),
    Binary {
        op: &'static str,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Stub for a functional interface: ignores its arguments and returns
    /// `result` (nothing for `void`).
    Lambda {
        arity: usize,
        result: Option<String>,
    },
}

impl Expr {
    pub fn binary(op: &'static str, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn render(&self) -> String {
        self.render_with(&BTreeSet::new())
    }

    /// Renders with the classes in `qualified` written in full.
    pub fn render_with(&self, qualified: &BTreeSet<String>) -> String {
        match self {
            Expr::Var(name) => name.clone(),
            Expr::Literal(text) => text.clone(),
            Expr::New { ty, args, .. } => format!(
                "new {}({})",
                ty.render_with(qualified),
                render_args(args, qualified)
            ),
            Expr::Call {
                target,
                method,
                args,
                ..
            } => {
                let receiver = match target {
                    CallTarget::Static(ty) => ty.render_with(qualified),
                    CallTarget::Receiver(expr) => expr.render_with(qualified),
                };
                format!("{}.{}({})", receiver, method, render_args(args, qualified))
            }
            Expr::Assign { name, value } => format!("{} = {}", name, value.render_with(qualified)),
            Expr::Paren(inner) => format!("({})", inner.render_with(qualified)),
            Expr::Binary { op, lhs, rhs } => format!(
                "{} {} {}",
                lhs.render_with(qualified),
                op,
                rhs.render_with(qualified)
            ),
            Expr::Lambda { arity, result } => {
                let params: Vec<String> = (0..*arity).map(|i| format!("_arg{}", i)).collect();
                let body = match result {
                    Some(value) => value.clone(),
                    None => "{ }".to_string(),
                };
                format!("({}) -> {}", params.join(", "), body)
            }
        }
    }

    fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Var(_) | Expr::Literal(_) | Expr::Lambda { .. } => Vec::new(),
            Expr::New { args, .. } => args.iter().collect(),
            Expr::Call { target, args, .. } => {
                let mut out: Vec<&Expr> = Vec::new();
                if let CallTarget::Receiver(r) = target {
                    out.push(r);
                }
                out.extend(args.iter());
                out
            }
            Expr::Assign { value, .. } => vec![value],
            Expr::Paren(inner) => vec![inner],
            Expr::Binary { lhs, rhs, .. } => vec![lhs, rhs],
        }
    }

    /// Checked exceptions thrown anywhere in this expression.
    pub fn thrown(&self, out: &mut BTreeSet<String>) {
        match self {
            Expr::New { throws, .. } | Expr::Call { throws, .. } => {
                out.extend(throws.iter().cloned())
            }
            _ => {}
        }
        self.children().into_iter().for_each(|c| c.thrown(out));
    }

    /// Counts reads of each variable. Assignment targets are not reads.
    pub fn count_uses(&self, uses: &mut HashMap<String, usize>) {
        if let Expr::Var(name) = self {
            *uses.entry(name.clone()).or_default() += 1;
        }
        self.children().into_iter().for_each(|c| c.count_uses(uses));
    }

    pub fn referenced_classes(&self, out: &mut BTreeSet<String>) {
        match self {
            Expr::New { ty, .. } => ty.referenced_classes(out),
            Expr::Call {
                target: CallTarget::Static(ty),
                ..
            } => ty.referenced_classes(out),
            _ => {}
        }
        self.children()
            .into_iter()
            .for_each(|c| c.referenced_classes(out));
    }

    /// The variable this expression defines with a constructor call, looking
    /// through parentheses and chained assignments.
    pub fn constructor_definition(&self) -> Option<&str> {
        match self {
            Expr::Paren(inner) => inner.constructor_definition(),
            Expr::Assign { name, value } => match value.as_ref() {
                Expr::New { .. } => Some(name),
                other => other.constructor_definition(),
            },
            _ => None,
        }
    }
}

fn render_args(args: &[Expr], qualified: &BTreeSet<String>) -> String {
    args.iter()
        .map(|a| a.render_with(qualified))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Clone, Debug, PartialEq)]
pub struct Catch {
    pub exception: Type,
    pub var: String,
    pub body: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    Expr(Expr),
    If {
        cond: Expr,
        then_arm: Vec<Stmt>,
        else_arm: Vec<Stmt>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    Try {
        body: Vec<Stmt>,
        catches: Vec<Catch>,
    },
}

impl Stmt {
    pub fn assign(name: &str, value: Expr) -> Stmt {
        Stmt::Expr(Expr::Assign {
            name: name.to_string(),
            value: Box::new(value),
        })
    }

    pub fn count_uses(&self, uses: &mut HashMap<String, usize>) {
        match self {
            Stmt::Expr(e) => e.count_uses(uses),
            Stmt::If {
                cond,
                then_arm,
                else_arm,
            } => {
                cond.count_uses(uses);
                then_arm.iter().chain(else_arm).for_each(|s| s.count_uses(uses));
            }
            Stmt::While { cond, body } => {
                cond.count_uses(uses);
                body.iter().for_each(|s| s.count_uses(uses));
            }
            Stmt::Try { body, catches } => {
                body.iter().for_each(|s| s.count_uses(uses));
                for c in catches {
                    c.body.iter().for_each(|s| s.count_uses(uses));
                }
            }
        }
    }

    /// Counts assignments to each variable.
    pub fn count_definitions(&self, defs: &mut HashMap<String, usize>) {
        fn visit(e: &Expr, defs: &mut HashMap<String, usize>) {
            if let Expr::Assign { name, .. } = e {
                *defs.entry(name.clone()).or_default() += 1;
            }
            e.children().into_iter().for_each(|c| visit(c, defs));
        }
        match self {
            Stmt::Expr(e) => visit(e, defs),
            Stmt::If {
                cond,
                then_arm,
                else_arm,
            } => {
                visit(cond, defs);
                then_arm
                    .iter()
                    .chain(else_arm)
                    .for_each(|s| s.count_definitions(defs));
            }
            Stmt::While { cond, body } => {
                visit(cond, defs);
                body.iter().for_each(|s| s.count_definitions(defs));
            }
            Stmt::Try { body, catches } => {
                body.iter().for_each(|s| s.count_definitions(defs));
                for c in catches {
                    c.body.iter().for_each(|s| s.count_definitions(defs));
                }
            }
        }
    }

    pub fn referenced_classes(&self, out: &mut BTreeSet<String>) {
        match self {
            Stmt::Expr(e) => e.referenced_classes(out),
            Stmt::If {
                cond,
                then_arm,
                else_arm,
            } => {
                cond.referenced_classes(out);
                then_arm
                    .iter()
                    .chain(else_arm)
                    .for_each(|s| s.referenced_classes(out));
            }
            Stmt::While { cond, body } => {
                cond.referenced_classes(out);
                body.iter().for_each(|s| s.referenced_classes(out));
            }
            Stmt::Try { body, catches } => {
                body.iter().for_each(|s| s.referenced_classes(out));
                for c in catches {
                    c.exception.referenced_classes(out);
                    c.body.iter().for_each(|s| s.referenced_classes(out));
                }
            }
        }
    }

    fn render(&self, b: &mut SourceBuilder) {
        match self {
            Stmt::Expr(e) => b.push_line(&format!("{};", b.expr(e))),
            Stmt::If {
                cond,
                then_arm,
                else_arm,
            } => {
                b.push_line(&format!("if ({}) {{", b.expr(cond)));
                b.block(then_arm);
                if else_arm.is_empty() {
                    b.push_line("}");
                } else {
                    b.push_line("} else {");
                    b.block(else_arm);
                    b.push_line("}");
                }
            }
            Stmt::While { cond, body } => {
                b.push_line(&format!("while ({}) {{", b.expr(cond)));
                b.block(body);
                b.push_line("}");
            }
            Stmt::Try { body, catches } => {
                b.push_line("try {");
                b.block(body);
                for c in catches {
                    b.push_line(&format!(
                        "}} catch ({} {}) {{",
                        c.exception.render_with(b.qualified),
                        c.var
                    ));
                    b.block(&c.body);
                }
                b.push_line("}");
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Declaration {
    pub name: String,
    pub ty: Type,
}

/// A synthesized method body: hoisted declarations followed by statements.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Body {
    pub declarations: Vec<Declaration>,
    pub statements: Vec<Stmt>,
}

impl Body {
    pub fn referenced_classes(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        for d in &self.declarations {
            d.ty.referenced_classes(&mut out);
        }
        for s in &self.statements {
            s.referenced_classes(&mut out);
        }
        out
    }

    /// Renders one line per statement, each prefixed with `level` copies of
    /// `indent`.
    pub fn render(&self, indent: &str, level: usize) -> String {
        self.render_with(indent, level, &BTreeSet::new())
    }

    /// `render`, writing the classes in `qualified` with their full names.
    pub fn render_with(&self, indent: &str, level: usize, qualified: &BTreeSet<String>) -> String {
        let mut b = SourceBuilder::new(indent, level, qualified);
        for d in &self.declarations {
            b.push_line(&format!("{} {};", d.ty.render_with(qualified), d.name));
        }
        for s in &self.statements {
            s.render(&mut b);
        }
        b.build()
    }
}

struct SourceBuilder<'q> {
    content: String,
    indent_level: usize,
    indent: String,
    qualified: &'q BTreeSet<String>,
}

impl<'q> SourceBuilder<'q> {
    fn new(indent: &str, level: usize, qualified: &'q BTreeSet<String>) -> Self {
        SourceBuilder {
            content: String::new(),
            indent_level: level,
            indent: indent.to_string(),
            qualified,
        }
    }

    fn expr(&self, e: &Expr) -> String {
        e.render_with(self.qualified)
    }

    fn push_line(&mut self, line: &str) {
        for _ in 0..self.indent_level {
            self.content.push_str(&self.indent);
        }
        self.content.push_str(line);
        self.content.push('\n');
    }

    fn block(&mut self, stmts: &[Stmt]) {
        self.indent_level += 1;
        for s in stmts {
            s.render(self);
        }
        self.indent_level -= 1;
    }

    fn build(self) -> String {
        self.content
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::{TypeIndex, TypeResolver};
    use std::fs;

    fn java_index() -> TypeIndex {
        let text = fs::read_to_string("tests/java-index.json")
            .expect("Unable to read tests/java-index.json");
        TypeIndex::from_json(&text).unwrap()
    }

    #[test]
    fn test_render_try_with_branch() {
        let index = java_index();
        let reader = Type::named("java.io.FileReader", &index).unwrap();
        let fnfe = Type::named("java.io.FileNotFoundException", &index).unwrap();
        let body = Body {
            declarations: vec![Declaration {
                name: "fileReader1".to_string(),
                ty: reader.clone(),
            }],
            statements: vec![Stmt::Try {
                body: vec![
                    Stmt::assign(
                        "fileReader1",
                        Expr::New {
                            ty: reader,
                            args: vec![Expr::Var("file".to_string())],
                            throws: vec![fnfe.name()],
                        },
                    ),
                    Stmt::If {
                        cond: Expr::binary(
                            "!=",
                            Expr::Var("fileReader1".to_string()),
                            Expr::Literal("null".to_string()),
                        ),
                        then_arm: vec![],
                        else_arm: vec![],
                    },
                ],
                catches: vec![Catch {
                    exception: fnfe,
                    var: "e1".to_string(),
                    body: vec![],
                }],
            }],
        };
        let expected = "\
    FileReader fileReader1;
    try {
        fileReader1 = new FileReader(file);
        if (fileReader1 != null) {
        }
    } catch (FileNotFoundException e1) {
    }
";
        assert_eq!(body.render("    ", 1), expected);
        let classes: Vec<String> = body.referenced_classes().into_iter().collect();
        assert_eq!(classes, vec!["java.io.FileNotFoundException", "java.io.FileReader"]);
        assert!(index.is_subclass("java.io.FileNotFoundException", "java.io.IOException"));
    }

    #[test]
    fn test_render_with_qualified_names() {
        let index = java_index();
        let reader = Type::named("java.io.BufferedReader", &index).unwrap();
        let string = Type::named("java.lang.String", &index).unwrap();
        let list = Type::concretized(index.resolve("java.util.ArrayList").unwrap(), vec![reader.clone()])
            .unwrap();
        let body = Body {
            declarations: vec![Declaration {
                name: "arrayList1".to_string(),
                ty: list.clone(),
            }],
            statements: vec![Stmt::assign(
                "string1",
                Expr::Call {
                    target: CallTarget::Static(string),
                    method: "valueOf".to_string(),
                    args: vec![Expr::New {
                        ty: list,
                        args: vec![],
                        throws: vec![],
                    }],
                    throws: vec![],
                },
            )],
        };
        let qualified: BTreeSet<String> = ["java.io.BufferedReader", "java.lang.String"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            body.render_with("  ", 0, &qualified),
            "\
ArrayList<java.io.BufferedReader> arrayList1;
string1 = java.lang.String.valueOf(new ArrayList<java.io.BufferedReader>());
"
        );
        assert_eq!(
            body.render("  ", 0),
            "ArrayList<BufferedReader> arrayList1;\nstring1 = String.valueOf(new ArrayList<BufferedReader>());\n"
        );
    }

    #[test]
    fn test_uses_and_definitions() {
        let stmt = Stmt::assign(
            "b1",
            Expr::Paren(Box::new(Expr::Call {
                target: CallTarget::Receiver(Box::new(Expr::Var("r1".to_string()))),
                method: "ready".to_string(),
                args: vec![Expr::Var("r1".to_string())],
                throws: vec!["java.io.IOException".to_string()],
            })),
        );
        let mut uses = HashMap::new();
        stmt.count_uses(&mut uses);
        assert_eq!(uses.get("r1"), Some(&2));
        assert_eq!(uses.get("b1"), None);
        let mut defs = HashMap::new();
        stmt.count_definitions(&mut defs);
        assert_eq!(defs.get("b1"), Some(&1));
        match &stmt {
            Stmt::Expr(e) => {
                assert_eq!(e.constructor_definition(), None);
                let mut thrown = BTreeSet::new();
                e.thrown(&mut thrown);
                assert!(thrown.contains("java.io.IOException"));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_lambda_stub() {
        let stub = Expr::Lambda {
            arity: 2,
            result: Some("0".to_string()),
        };
        assert_eq!(stub.render(), "(_arg0, _arg1) -> 0");
        let void = Expr::Lambda {
            arity: 0,
            result: None,
        };
        assert_eq!(void.render(), "() -> { }");
    }
}
