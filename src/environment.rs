use std::collections::{BTreeSet, HashMap};

use crate::config::{Ranker, SynthesisConfig};
use crate::error::SynthesisError;
use crate::hierarchy::TypeResolver;
use crate::java::Declaration;
use crate::types::Type;

const CATCH_PREFIX: &str = "e";

#[derive(Clone, Debug)]
pub struct Variable {
    pub name: String,
    pub ty: Type,
    pub ref_count: u32,
    /// `false` for catch parameters, which never outlive their clause.
    pub joinable: bool,
    pub user_supplied: bool,
}

/// Variables visible at one point of the synthesized program. Phantoms are
/// declared (hoisted) but not definitely assigned here, so they must not be
/// read.
#[derive(Clone, Debug, Default)]
pub struct Scope {
    pub live: Vec<Variable>,
    pub phantom: Vec<Variable>,
}

impl Scope {
    pub fn lookup(&self, name: &str) -> Option<&Variable> {
        self.live.iter().find(|v| v.name == name)
    }

    pub fn is_phantom(&self, name: &str) -> bool {
        self.phantom.iter().any(|v| v.name == name)
    }

    fn mentions(&self, name: &str) -> bool {
        self.lookup(name).is_some() || self.is_phantom(name)
    }

    /// Merges the scopes of parallel control-flow arms back into `parent`.
    ///
    /// Variables of the parent stay live. A joinable variable created in the
    /// arms is live afterwards only if every arm holds it with the same type;
    /// otherwise it becomes a phantom. Non-joinable variables are dropped.
    pub fn join(parent: &Scope, siblings: &[Scope]) -> Scope {
        let mut live: Vec<Variable> = parent
            .live
            .iter()
            .map(|v| {
                let mut v = v.clone();
                for s in siblings {
                    if let Some(sv) = s.lookup(&v.name) {
                        v.ref_count = v.ref_count.max(sv.ref_count);
                        if sv.ty.ref_count() > v.ty.ref_count() {
                            v.ty = sv.ty.clone();
                        }
                    }
                }
                v
            })
            .collect();
        let mut phantom = parent.phantom.clone();

        for s in siblings {
            for v in s.live.iter().filter(|v| v.joinable) {
                if live.iter().any(|l| l.name == v.name) || phantom.iter().any(|p| p.name == v.name) {
                    continue;
                }
                let everywhere = siblings.iter().all(|other| {
                    other
                        .lookup(&v.name)
                        .map_or(false, |ov| ov.joinable && ov.ty == v.ty)
                });
                if everywhere {
                    let mut joined = v.clone();
                    joined.ref_count = siblings
                        .iter()
                        .filter_map(|other| other.lookup(&v.name))
                        .map(|ov| ov.ref_count)
                        .max()
                        .unwrap_or(v.ref_count);
                    live.push(joined);
                } else {
                    log::debug!("{} is not assigned on every path, hoisting as phantom", v.name);
                    phantom.push(v.clone());
                }
            }
            for p in &s.phantom {
                if !phantom.iter().any(|q| q.name == p.name) && !live.iter().any(|l| l.name == p.name)
                {
                    phantom.push(p.clone());
                }
            }
        }
        Scope { live, phantom }
    }
}

pub struct Snapshot {
    scopes: Vec<Scope>,
    declarations: usize,
    catch_names: BTreeSet<String>,
}

/// Per-attempt synthesis state: scope stack, hoisted declarations, names.
/// Created fresh for every candidate sketch.
pub struct Environment<'r> {
    resolver: &'r dyn TypeResolver,
    config: SynthesisConfig,
    ranker: Ranker,
    scopes: Vec<Scope>,
    declarations: Vec<Declaration>,
    catch_names: BTreeSet<String>,
    type_cache: HashMap<String, Type>,
}

impl<'r> Environment<'r> {
    pub fn new(resolver: &'r dyn TypeResolver, config: SynthesisConfig, attempt: u64) -> Self {
        let ranker = Ranker::new(config.tie_break, attempt);
        Environment {
            resolver,
            config,
            ranker,
            scopes: vec![Scope::default()],
            declarations: Vec::new(),
            catch_names: BTreeSet::new(),
            type_cache: HashMap::new(),
        }
    }

    pub fn resolver(&self) -> &'r dyn TypeResolver {
        self.resolver
    }

    pub fn config(&self) -> &SynthesisConfig {
        &self.config
    }

    pub fn ranker(&mut self) -> &mut Ranker {
        &mut self.ranker
    }

    pub fn scope(&self) -> &Scope {
        // the root scope is never popped
        &self.scopes[self.scopes.len() - 1]
    }

    fn scope_mut(&mut self) -> &mut Scope {
        let last = self.scopes.len() - 1;
        &mut self.scopes[last]
    }

    /// Enters a control-flow arm; the new scope sees everything the current
    /// one does.
    pub fn push_scope(&mut self) {
        let child = self.scope().clone();
        self.scopes.push(child);
    }

    pub fn pop_scope(&mut self) -> Scope {
        if self.scopes.len() == 1 {
            log::warn!("attempt to pop the root scope");
            return self.scope().clone();
        }
        self.scopes.pop().unwrap_or_default()
    }

    /// Joins the scopes of sibling arms into the current scope.
    pub fn join(&mut self, siblings: Vec<Scope>) {
        if siblings.is_empty() {
            return;
        }
        let joined = Scope::join(self.scope(), &siblings);
        *self.scope_mut() = joined;
    }

    pub fn add_user_variable(&mut self, name: &str, ty: Type) {
        self.scope_mut().live.push(Variable {
            name: name.to_string(),
            ty,
            ref_count: 0,
            joinable: true,
            user_supplied: true,
        });
    }

    /// Creates a new hoisted variable of type `ty` and makes it live.
    pub fn declare_fresh(&mut self, ty: &Type) -> String {
        let name = self.fresh_name(&ty.var_prefix(), ty, true);
        if !self.declarations.iter().any(|d| d.name == name) {
            self.declarations.push(Declaration {
                name: name.clone(),
                ty: ty.clone(),
            });
        }
        self.scope_mut().live.push(Variable {
            name: name.clone(),
            ty: ty.clone(),
            ref_count: 0,
            joinable: true,
            user_supplied: false,
        });
        name
    }

    /// Binds a catch parameter in the current scope. It is not hoisted and is
    /// dropped at the next join.
    pub fn bind_catch_variable(&mut self, ty: &Type) -> String {
        let name = self.fresh_name(CATCH_PREFIX, ty, false);
        self.catch_names.insert(name.clone());
        self.scope_mut().live.push(Variable {
            name: name.clone(),
            ty: ty.clone(),
            ref_count: 0,
            joinable: false,
            user_supplied: false,
        });
        name
    }

    // Parallel arms produce the same name for the same type, so their
    // definitions meet at the join.
    fn fresh_name(&self, prefix: &str, ty: &Type, hoisted: bool) -> String {
        let mut i = 1;
        loop {
            let name = format!("{}{}", prefix, i);
            let free = !self.scope().mentions(&name)
                && !self.catch_names.contains(&name)
                && match self.declarations.iter().find(|d| d.name == name) {
                    Some(d) => hoisted && d.ty == *ty,
                    None => true,
                };
            if free {
                return name;
            }
            i += 1;
        }
    }

    /// Live variables assignable to `target`.
    pub fn assignable_variables(&self, target: &Type) -> Vec<&Variable> {
        self.scope()
            .live
            .iter()
            .filter(|v| v.ty.is_assignable_to(target, self.resolver))
            .collect()
    }

    pub fn use_variable(&mut self, name: &str) {
        if let Some(v) = self.scope_mut().live.iter_mut().find(|v| v.name == name) {
            v.ref_count += 1;
        }
    }

    /// Records that the type of variable `name` was used as a type argument.
    pub fn use_type_of(&mut self, name: &str) {
        if let Some(v) = self.scope_mut().live.iter_mut().find(|v| v.name == name) {
            v.ty.bump();
        }
    }

    /// Resolves a class name through the per-attempt cache.
    pub fn resolve_type(&mut self, name: &str) -> Result<Type, SynthesisError> {
        if let Some(ty) = self.type_cache.get(name) {
            return Ok(ty.clone());
        }
        let ty = Type::named(name, self.resolver)?;
        self.type_cache.insert(name.to_string(), ty.clone());
        Ok(ty)
    }

    pub fn declarations(&self) -> &[Declaration] {
        &self.declarations
    }

    pub fn is_user_variable(&self, name: &str) -> bool {
        self.scopes
            .iter()
            .any(|s| s.lookup(name).map_or(false, |v| v.user_supplied))
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            scopes: self.scopes.clone(),
            declarations: self.declarations.len(),
            catch_names: self.catch_names.clone(),
        }
    }

    /// Undoes everything since `snapshot` was taken.
    pub fn restore(&mut self, snapshot: Snapshot) {
        self.scopes = snapshot.scopes;
        self.declarations.truncate(snapshot.declarations);
        self.catch_names = snapshot.catch_names;
    }
}
