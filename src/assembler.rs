use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use crate::config::SynthesisConfig;
use crate::environment::Environment;
use crate::error::{RequestError, SynthesisError};
use crate::hierarchy::TypeResolver;
use crate::java::Body;
use crate::parser::{parse_hole_block, parse_parameter_list};
use crate::schema::{package_of, simple_name, TypeExpr};
use crate::sketches::{Candidate, Sketch};
use crate::synthesizer::synthesize;
use crate::types::{Subst, Type};

const DEFAULT_INDENT: &str = "    ";

/// The marked block to fill, as a byte range of the source.
#[derive(Clone, Debug)]
pub struct Hole {
    pub start: usize,
    pub end: usize,
    /// Leading whitespace of the line holding the opening brace.
    pub line_indent: String,
    /// One level of indentation as used by the source.
    pub indent: String,
    /// Evidence kinds and arguments written in the hole.
    pub evidence: Vec<(String, Vec<String>)>,
    /// Variables in scope at the hole: the enclosing method's parameters,
    /// plus whatever the caller adds.
    pub variables: Vec<(String, Type)>,
}

/// Locates the single hole in `source` and resolves the parameters of the
/// method around it.
pub fn find_hole(source: &str, resolver: &dyn TypeResolver) -> Result<Hole, RequestError> {
    let mut holes = Vec::new();
    let mut from = 0;
    while let Some(offset) = source[from..].find('{') {
        let start = from + offset;
        match parse_hole_block(&source[start..]) {
            Ok((rest, evidence)) => {
                let end = source.len() - rest.len();
                let evidence: Vec<(String, Vec<String>)> = evidence
                    .into_iter()
                    .map(|(kind, args)| {
                        (kind.to_string(), args.into_iter().map(str::to_string).collect())
                    })
                    .collect();
                holes.push((start, end, evidence));
                from = end;
            }
            Err(_) => from = start + 1,
        }
    }
    let (start, end, evidence) = match holes.len() {
        0 => return Err(RequestError::NoHoleFound),
        1 => holes.remove(0),
        count => return Err(RequestError::MultipleHoles { count }),
    };
    let line_start = source[..start].rfind('\n').map_or(0, |i| i + 1);
    let line_indent: String = source[line_start..start]
        .chars()
        .take_while(|c| c.is_whitespace())
        .collect();
    let indent = if line_indent.contains('\t') {
        "\t".to_string()
    } else {
        DEFAULT_INDENT.to_string()
    };
    let imports = source_imports(source);
    let variables = method_parameters(&source[..start])
        .into_iter()
        .filter_map(|(ty, name)| match resolve_source_type(&ty, &imports, resolver) {
            Ok(ty) => Some((name, ty)),
            Err(e) => {
                log::warn!("ignoring parameter {}: {}", name, e);
                None
            }
        })
        .collect();
    Ok(Hole {
        start,
        end,
        line_indent,
        indent,
        evidence,
        variables,
    })
}

/// Parameters of the method header that ends right before `prefix`, if any.
fn method_parameters(prefix: &str) -> Vec<(TypeExpr, String)> {
    let head = prefix.trim_end();
    let head = match head.rfind(')') {
        Some(close) => {
            let between = head[close + 1..].trim();
            if !between.is_empty() && !between.starts_with("throws") {
                return Vec::new();
            }
            &head[..=close]
        }
        None => return Vec::new(),
    };
    let mut depth = 0;
    let mut open = None;
    for (i, c) in head.char_indices().rev() {
        match c {
            ')' => depth += 1,
            '(' => {
                depth -= 1;
                if depth == 0 {
                    open = Some(i);
                    break;
                }
            }
            _ => {}
        }
    }
    let open = match open {
        Some(open) => open,
        None => return Vec::new(),
    };
    match parse_parameter_list(&head[open..]) {
        Ok((_, params)) => params
            .into_iter()
            .map(|(ty, name)| (ty, name.to_string()))
            .collect(),
        Err(e) => {
            log::debug!("no parameter list before the hole: {}", e);
            Vec::new()
        }
    }
}

/// `import` lines of the source: simple name → qualified name. Wildcard
/// imports are returned under `*` keys by package.
fn source_imports(source: &str) -> HashMap<String, String> {
    source
        .lines()
        .filter_map(|l| l.trim().strip_prefix("import "))
        .filter(|l| !l.starts_with("static "))
        .filter_map(|l| l.trim().strip_suffix(';'))
        .map(|name| {
            let name = name.trim();
            match name.strip_suffix(".*") {
                Some(package) => (format!("{}.*", package), package.to_string()),
                None => (simple_name(name), name.to_string()),
            }
        })
        .collect()
}

fn source_package(source: &str) -> Option<&str> {
    source
        .lines()
        .filter_map(|l| l.trim().strip_prefix("package "))
        .filter_map(|l| l.trim().strip_suffix(';'))
        .map(str::trim)
        .next()
}

/// Qualifies the simple class names a source file writes, through its
/// imports first and the type index second.
fn qualify(
    expr: &TypeExpr,
    imports: &HashMap<String, String>,
    resolver: &dyn TypeResolver,
) -> TypeExpr {
    match expr {
        TypeExpr::Class { name, args } => {
            let name = if name.contains('.') {
                name.clone()
            } else if let Some(q) = imports.get(name) {
                q.clone()
            } else {
                let wildcard = imports
                    .iter()
                    .filter(|(k, _)| k.ends_with(".*"))
                    .map(|(_, package)| format!("{}.{}", package, name))
                    .find(|q| resolver.resolve(q).is_ok());
                match wildcard.or_else(|| resolver.resolve_simple(name).map(|c| c.name.clone())) {
                    Some(q) => q,
                    None => name.clone(),
                }
            };
            TypeExpr::Class {
                name,
                args: args.iter().map(|a| qualify(a, imports, resolver)).collect(),
            }
        }
        TypeExpr::Wildcard(Some(bound)) => {
            TypeExpr::Wildcard(Some(Box::new(qualify(bound, imports, resolver))))
        }
        TypeExpr::SuperWildcard(bound) => {
            TypeExpr::SuperWildcard(Box::new(qualify(bound, imports, resolver)))
        }
        TypeExpr::Array(elem) => TypeExpr::Array(Box::new(qualify(elem, imports, resolver))),
        other => other.clone(),
    }
}

fn resolve_source_type(
    expr: &TypeExpr,
    imports: &HashMap<String, String>,
    resolver: &dyn TypeResolver,
) -> Result<Type, SynthesisError> {
    Type::from_expr(&qualify(expr, imports, resolver), &Subst::new(), resolver)
}

/// Replaces the hole with `body` and adds the imports it needs. Classes
/// whose simple name is already taken in the file are written in full.
pub fn splice(source: &str, hole: &Hole, body: &Body, resolver: &dyn TypeResolver) -> String {
    let plan = plan_imports(source, &body.referenced_classes(), resolver);
    let level = hole.line_indent.matches(hole.indent.as_str()).count() + 1;
    let mut block = String::from("{\n");
    block.push_str(&body.render_with(&hole.indent, level, &plan.qualified));
    block.push_str(&hole.line_indent);
    block.push('}');

    let mut program = String::with_capacity(source.len() + block.len());
    program.push_str(&source[..hole.start]);
    program.push_str(&block);
    program.push_str(&source[hole.end..]);
    add_imports(&program, &plan.imports)
}

/// How the classes of a body become visible in the file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImportPlan {
    /// Classes that get a new `import` line.
    pub imports: BTreeSet<String>,
    /// Classes whose simple name means something else in the file.
    pub qualified: BTreeSet<String>,
}

/// Decides, per referenced class, between nothing (already visible), a new
/// import, and writing the qualified name. A simple name is taken by a
/// single-type import, by an earlier class of the same plan, or by a class of
/// `java.lang`, the file's package or a wildcard-imported package that the
/// type index knows.
pub fn plan_imports(
    source: &str,
    classes: &BTreeSet<String>,
    resolver: &dyn TypeResolver,
) -> ImportPlan {
    let existing = source_imports(source);
    let package = source_package(source).unwrap_or_default();
    let wildcards: Vec<&String> = existing
        .iter()
        .filter(|(k, _)| k.ends_with(".*"))
        .map(|(_, p)| p)
        .collect();
    let mut taken: HashMap<String, String> = existing
        .iter()
        .filter(|(k, _)| !k.ends_with(".*"))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let mut plan = ImportPlan::default();
    // implicitly visible classes claim their names first
    let (implicit, explicit): (Vec<&String>, Vec<&String>) = classes.iter().partition(|c| {
        let p = package_of(c);
        p == "java.lang" || p == package || wildcards.iter().any(|w| w.as_str() == p)
    });
    for class in implicit {
        let simple = simple_name(class);
        match taken.get(&simple) {
            Some(owner) if owner != class => {
                plan.qualified.insert(class.clone());
            }
            _ => {
                taken.insert(simple, class.clone());
            }
        }
    }
    for class in explicit {
        let simple = simple_name(class);
        if let Some(owner) = taken.get(&simple) {
            if owner != class {
                log::debug!("{} clashes with {}", class, owner);
                plan.qualified.insert(class.clone());
            }
            continue;
        }
        let mut visible = vec![format!("java.lang.{}", simple)];
        if !package.is_empty() {
            visible.push(format!("{}.{}", package, simple));
        }
        visible.extend(wildcards.iter().map(|w| format!("{}.{}", w, simple)));
        if visible.iter().any(|v| resolver.resolve(v).is_ok()) {
            log::debug!("{} would shadow a visible {}", class, simple);
            plan.qualified.insert(class.clone());
            continue;
        }
        taken.insert(simple, class.clone());
        plan.imports.insert(class.clone());
    }
    plan
}

/// Inserts an `import` line per class after the existing imports, or after
/// the package line.
pub fn add_imports(source: &str, imports: &BTreeSet<String>) -> String {
    if imports.is_empty() {
        return source.to_string();
    }
    let lines: Vec<&str> = source.lines().collect();
    let anchor = lines
        .iter()
        .rposition(|l| l.trim_start().starts_with("import "))
        .or_else(|| lines.iter().position(|l| l.trim_start().starts_with("package ")));
    let new_imports: Vec<String> = imports.iter().map(|c| format!("import {};", c)).collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len() + new_imports.len() + 2);
    match anchor {
        Some(i) => {
            out.extend(lines[..=i].iter().map(|l| l.to_string()));
            if !lines[i].trim_start().starts_with("import ") {
                out.push(String::new());
            }
            out.extend(new_imports);
            out.extend(lines[i + 1..].iter().map(|l| l.to_string()));
        }
        None => {
            out.extend(new_imports);
            out.push(String::new());
            out.extend(lines.iter().map(|l| l.to_string()));
        }
    }
    let mut text = out.join("\n");
    if source.ends_with('\n') {
        text.push('\n');
    }
    text
}

/// Programs produced for one request, and how many candidates failed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SynthesisOutput {
    pub programs: Vec<String>,
    pub rejected: usize,
}

/// Runs candidate sketches against one source file. The type index is
/// shared read-only; every candidate gets a fresh environment.
pub struct Engine {
    resolver: Arc<dyn TypeResolver>,
    config: SynthesisConfig,
}

impl Engine {
    pub fn new(resolver: Arc<dyn TypeResolver>, config: SynthesisConfig) -> Self {
        Engine { resolver, config }
    }

    pub fn config(&self) -> &SynthesisConfig {
        &self.config
    }

    pub fn find_hole(&self, source: &str) -> Result<Hole, RequestError> {
        find_hole(source, self.resolver.as_ref())
    }

    pub fn run(&self, source: &str, sketches: &[Sketch]) -> Result<SynthesisOutput, RequestError> {
        let candidates: Vec<Candidate> = sketches.iter().cloned().map(Ok).collect();
        self.run_batch(source, &candidates)
    }

    /// `run` over a batch as read by `sketches_from_json`.
    pub fn run_batch(
        &self,
        source: &str,
        candidates: &[Candidate],
    ) -> Result<SynthesisOutput, RequestError> {
        let hole = self.find_hole(source)?;
        Ok(self.run_hole(source, &hole, candidates))
    }

    /// Synthesizes every candidate into `hole`. Candidates that could not be
    /// read or that fail are counted as rejected; duplicates up to whitespace
    /// are dropped.
    pub fn run_hole(&self, source: &str, hole: &Hole, candidates: &[Candidate]) -> SynthesisOutput {
        let mut output = SynthesisOutput::default();
        let mut seen = HashSet::new();
        for (attempt, candidate) in candidates.iter().enumerate() {
            if output.programs.len() >= self.config.max_programs {
                log::info!("reached {} programs, skipping the rest", self.config.max_programs);
                break;
            }
            let sketch = match candidate {
                Ok(sketch) => sketch,
                Err(e) => {
                    log::info!("candidate {} rejected: {}", attempt, e);
                    output.rejected += 1;
                    continue;
                }
            };
            let mut env = Environment::new(self.resolver.as_ref(), self.config.clone(), attempt as u64);
            for (name, ty) in &hole.variables {
                env.add_user_variable(name, ty.clone());
            }
            let body = match synthesize(sketch, &mut env) {
                Ok(body) => body,
                Err(e) => {
                    log::info!("candidate {} rejected: {}", attempt, e);
                    log::debug!("rejected sketch:\n{}", sketch);
                    output.rejected += 1;
                    continue;
                }
            };
            let program = splice(source, hole, &body, self.resolver.as_ref());
            if seen.insert(without_whitespace(&program)) {
                output.programs.push(program);
            } else {
                log::debug!("candidate {} duplicates an earlier program", attempt);
            }
        }
        output
    }
}

fn without_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}
