//! Passes over a synthesized body: catching what the sketch left uncaught,
//! and removing constructions nobody reads.

use std::collections::{BTreeSet, HashMap};

use crate::environment::Environment;
use crate::error::SynthesisError;
use crate::hierarchy::{common_superclass, most_specific_first, TypeResolver};
use crate::java::{Body, Catch, Stmt};
use crate::sketches::Sketch;

/// Checked exceptions of the sketch's calls that no `Except` node handles.
pub fn uncaught_exceptions(
    sketch: &Sketch,
    thrown_by: &HashMap<String, Vec<String>>,
) -> BTreeSet<String> {
    sketch
        .uncovered_calls()
        .into_iter()
        .filter_map(|c| thrown_by.get(&c.signature))
        .flatten()
        .cloned()
        .collect()
}

/// Wraps `statements` in one try statement with a clause per exception,
/// subclasses first.
pub fn wrap_exceptions(
    statements: Vec<Stmt>,
    exceptions: &BTreeSet<String>,
    env: &mut Environment,
) -> Result<Vec<Stmt>, SynthesisError> {
    if exceptions.is_empty() {
        return Ok(statements);
    }
    let resolver = env.resolver();
    let ordered = most_specific_first(exceptions, resolver);
    let shared = env.resolve_type(&common_superclass(&ordered, resolver))?;
    env.push_scope();
    let var = env.bind_catch_variable(&shared);
    env.pop_scope();

    let mut catches = Vec::with_capacity(ordered.len());
    for name in &ordered {
        catches.push(Catch {
            exception: env.resolve_type(name)?,
            var: var.clone(),
            body: Vec::new(),
        });
    }
    log::debug!("wrapping body for {:?}", ordered);
    Ok(vec![Stmt::Try {
        body: statements,
        catches,
    }])
}

/// Removes constructor assignments to sketch call results that are defined
/// once and never read, then drops catch clauses nothing in their try body
/// throws any more, and finally declarations no statement mentions. A single
/// pass: the arguments of a removed construction are kept even if it was
/// their only reader.
pub fn eliminate_dead_code(mut body: Body, results: &BTreeSet<String>, env: &Environment) -> Body {
    let mut uses = HashMap::new();
    let mut defs = HashMap::new();
    for s in &body.statements {
        s.count_uses(&mut uses);
        s.count_definitions(&mut defs);
    }
    let dead: BTreeSet<&str> = results
        .iter()
        .filter(|n| defs.get(*n) == Some(&1) && !uses.contains_key(*n))
        .filter(|n| !env.is_user_variable(n))
        .map(String::as_str)
        .collect();
    if dead.is_empty() {
        return body;
    }

    let mut removed = BTreeSet::new();
    body.statements = remove_definitions(body.statements, &dead, &mut removed);
    if removed.is_empty() {
        return body;
    }
    log::debug!("removed dead definitions of {:?}", removed);
    body.statements = prune_catches(body.statements, env.resolver());

    // unwrapping a try also drops its catch bodies, and whatever they declared
    let mut mentioned = HashMap::new();
    for s in &body.statements {
        s.count_uses(&mut mentioned);
        s.count_definitions(&mut mentioned);
    }
    body.declarations.retain(|d| mentioned.contains_key(&d.name));
    body
}

fn remove_definitions(
    stmts: Vec<Stmt>,
    dead: &BTreeSet<&str>,
    removed: &mut BTreeSet<String>,
) -> Vec<Stmt> {
    let mut out = Vec::with_capacity(stmts.len());
    for s in stmts {
        match s {
            Stmt::Expr(e) => {
                let defined = e
                    .constructor_definition()
                    .filter(|n| dead.contains(n))
                    .map(str::to_string);
                match defined {
                    Some(name) => {
                        removed.insert(name);
                    }
                    None => out.push(Stmt::Expr(e)),
                }
            }
            Stmt::If {
                cond,
                then_arm,
                else_arm,
            } => out.push(Stmt::If {
                cond,
                then_arm: remove_definitions(then_arm, dead, removed),
                else_arm: remove_definitions(else_arm, dead, removed),
            }),
            Stmt::While { cond, body } => out.push(Stmt::While {
                cond,
                body: remove_definitions(body, dead, removed),
            }),
            Stmt::Try { body, catches } => {
                let body = remove_definitions(body, dead, removed);
                let catches = catches
                    .into_iter()
                    .map(|mut c| {
                        c.body = remove_definitions(c.body, dead, removed);
                        c
                    })
                    .collect();
                out.push(Stmt::Try { body, catches })
            }
        }
    }
    out
}

/// Checked exceptions that leave `stmts` uncaught.
pub fn escaping(stmts: &[Stmt], resolver: &dyn TypeResolver) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    for s in stmts {
        match s {
            Stmt::Expr(e) => e.thrown(&mut out),
            Stmt::If {
                cond,
                then_arm,
                else_arm,
            } => {
                cond.thrown(&mut out);
                out.extend(escaping(then_arm, resolver));
                out.extend(escaping(else_arm, resolver));
            }
            Stmt::While { cond, body } => {
                cond.thrown(&mut out);
                out.extend(escaping(body, resolver));
            }
            Stmt::Try { body, catches } => {
                for x in escaping(body, resolver) {
                    let caught = catches
                        .iter()
                        .any(|c| resolver.is_subclass(&x, &c.exception.name()));
                    if !caught {
                        out.insert(x);
                    }
                }
                for c in catches {
                    out.extend(escaping(&c.body, resolver));
                }
            }
        }
    }
    out
}

// Every clause was created for an exception thrown exactly; keep it only
// while some statement of its try body still throws that exception.
fn prune_catches(stmts: Vec<Stmt>, resolver: &dyn TypeResolver) -> Vec<Stmt> {
    let mut out = Vec::with_capacity(stmts.len());
    for s in stmts {
        match s {
            Stmt::If {
                cond,
                then_arm,
                else_arm,
            } => out.push(Stmt::If {
                cond,
                then_arm: prune_catches(then_arm, resolver),
                else_arm: prune_catches(else_arm, resolver),
            }),
            Stmt::While { cond, body } => out.push(Stmt::While {
                cond,
                body: prune_catches(body, resolver),
            }),
            Stmt::Try { body, catches } => {
                let body = prune_catches(body, resolver);
                let thrown = escaping(&body, resolver);
                let catches: Vec<Catch> = catches
                    .into_iter()
                    .filter(|c| thrown.contains(&c.exception.name()))
                    .map(|mut c| {
                        c.body = prune_catches(c.body, resolver);
                        c
                    })
                    .collect();
                if catches.is_empty() {
                    log::debug!("unwrapping try without catch clauses");
                    out.extend(body);
                } else {
                    out.push(Stmt::Try { body, catches });
                }
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SynthesisConfig;
    use crate::hierarchy::TypeIndex;
    use crate::sketches::ApiCall;
    use crate::synthesizer::synthesize;
    use std::fs;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn java_index() -> TypeIndex {
        let text = fs::read_to_string("tests/java-index.json")
            .expect("Unable to read tests/java-index.json");
        TypeIndex::from_json(&text).unwrap()
    }

    fn env_with_file(index: &TypeIndex) -> Environment<'_> {
        let mut env = Environment::new(index, SynthesisConfig::default(), 0);
        let string = env.resolve_type("java.lang.String").unwrap();
        env.add_user_variable("file", string);
        env
    }

    #[test]
    fn test_uncaught_exceptions_skip_except_nodes() {
        let sketch = Sketch::subtree(vec![
            Sketch::call("java.io.FileReader(java.lang.String)"),
            Sketch::Except {
                try_arm: vec![Sketch::call("java.net.URL(java.lang.String)")],
                catch_arm: vec![],
            },
            Sketch::Branch {
                cond: vec![ApiCall::new("java.io.BufferedReader.ready()")],
                then_arm: vec![],
                else_arm: vec![],
            },
        ]);
        let thrown_by: HashMap<String, Vec<String>> = [
            ("java.io.FileReader(java.lang.String)", "java.io.FileNotFoundException"),
            ("java.net.URL(java.lang.String)", "java.net.MalformedURLException"),
            ("java.io.BufferedReader.ready()", "java.io.IOException"),
        ]
        .iter()
        .map(|(sig, ex)| (sig.to_string(), vec![ex.to_string()]))
        .collect();
        let uncaught: Vec<String> = uncaught_exceptions(&sketch, &thrown_by).into_iter().collect();
        assert_eq!(
            uncaught,
            vec!["java.io.FileNotFoundException", "java.io.IOException"]
        );
    }

    #[test]
    fn test_dead_construction_takes_its_catch_clause() {
        init();
        let index = java_index();
        let mut env = env_with_file(&index);
        let sketch = Sketch::subtree(vec![
            Sketch::call("java.io.FileReader(java.lang.String)"),
            Sketch::call("java.io.BufferedReader(java.io.Reader)"),
            Sketch::call("java.io.BufferedReader.readLine()"),
            Sketch::call("java.net.URL(java.lang.String)"),
        ]);
        let body = synthesize(&sketch, &mut env).unwrap();
        let expected = "\
FileReader fileReader1;
BufferedReader bufferedReader1;
String string1;
try {
    fileReader1 = new FileReader(file);
    bufferedReader1 = new BufferedReader(fileReader1);
    string1 = bufferedReader1.readLine();
} catch (FileNotFoundException e1) {
} catch (IOException e1) {
}
";
        assert_eq!(body.render("    ", 0), expected);
        assert!(!body
            .referenced_classes()
            .iter()
            .any(|c| c.starts_with("java.net.")));
    }

    #[test]
    fn test_single_pass_keeps_argument_of_dead_construction() {
        let index = java_index();
        let mut env = env_with_file(&index);
        let sketch = Sketch::subtree(vec![
            Sketch::call("java.io.FileReader(java.lang.String)"),
            Sketch::call("java.io.BufferedReader(java.io.Reader)"),
        ]);
        let body = synthesize(&sketch, &mut env).unwrap();
        let expected = "\
FileReader fileReader1;
try {
    fileReader1 = new FileReader(file);
} catch (FileNotFoundException e1) {
}
";
        assert_eq!(body.render("    ", 0), expected);
    }

    #[test]
    fn test_try_without_clauses_is_unwrapped() {
        let index = java_index();
        let mut env = env_with_file(&index);
        let sketch = Sketch::subtree(vec![
            Sketch::call("java.io.StringReader(java.lang.String)"),
            Sketch::call("java.io.BufferedReader(java.io.Reader)"),
            Sketch::call("java.net.URL(java.lang.String)"),
        ]);
        let body = synthesize(&sketch, &mut env).unwrap();
        assert_eq!(
            body.render("  ", 0),
            "StringReader stringReader1;\nstringReader1 = new StringReader(file);\n"
        );
        assert!(escaping(&body.statements, &index).is_empty());
    }

    #[test]
    fn test_unwrapped_try_takes_catch_declarations() {
        let index = java_index();
        let mut env = env_with_file(&index);
        let sketch = Sketch::Except {
            try_arm: vec![Sketch::call("java.net.URL(java.lang.String)")],
            catch_arm: vec![Sketch::call("java.lang.String.isEmpty()")],
        };
        let body = synthesize(&sketch, &mut env).unwrap();
        assert!(body.statements.is_empty());
        assert!(body.declarations.is_empty());
        assert_eq!(body.render("  ", 0), "");
    }
}
