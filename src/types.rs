use core::fmt;
use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    fmt::Debug,
    sync::Arc,
};

use crate::error::SynthesisError;
use crate::hierarchy::{TypeResolver, OBJECT};
use crate::schema::{
    import_name, simple_name, ClassInfo, ConstructorInfo, MethodInfo, Primitive, TypeExpr,
    TypeParam,
};

/// Generic parameter name → concrete type.
pub type Subst = BTreeMap<String, Type>;

/// Methods of `java.lang.Object` that never make an interface non-functional.
const OBJECT_METHODS: [&str; 3] = ["equals", "hashCode", "toString"];

#[derive(Clone)]
pub enum TypeKind {
    Primitive(Primitive),
    Class {
        class: Arc<ClassInfo>,
        /// `None` for non-generic classes and for generic classes whose
        /// parameters are still free.
        concretization: Option<Subst>,
    },
    Array(Box<Type>),
}

/// A resolved type. The reuse counter feeds search heuristics and is ignored
/// by equality.
#[derive(Clone)]
pub struct Type {
    pub kind: TypeKind,
    ref_count: u32,
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        match (&self.kind, &other.kind) {
            (TypeKind::Primitive(a), TypeKind::Primitive(b)) => a == b,
            (
                TypeKind::Class {
                    class: a,
                    concretization: ca,
                },
                TypeKind::Class {
                    class: b,
                    concretization: cb,
                },
            ) => a.name == b.name && ca == cb,
            (TypeKind::Array(a), TypeKind::Array(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Type {}

/// A constructor or method with every parameter bound to a concrete type.
#[derive(Clone, Debug)]
pub struct BoundMember {
    /// Method name; the class name for constructors.
    pub name: String,
    /// Class that declares the member.
    pub owner: String,
    pub params: Vec<Type>,
    /// Return type; the constructed type for constructors.
    pub returns: Type,
    /// Checked exceptions only.
    pub throws: Vec<String>,
    pub is_static: bool,
    pub is_constructor: bool,
}

impl BoundMember {
    pub fn throws_checked(&self) -> bool {
        !self.throws.is_empty()
    }
}

impl Type {
    pub fn primitive(p: Primitive) -> Type {
        Type {
            kind: TypeKind::Primitive(p),
            ref_count: 0,
        }
    }

    pub fn void() -> Type {
        Type::primitive(Primitive::Void)
    }

    pub fn boolean() -> Type {
        Type::primitive(Primitive::Boolean)
    }

    /// A class type; generic classes start out free.
    pub fn class(class: Arc<ClassInfo>) -> Type {
        Type {
            kind: TypeKind::Class {
                class,
                concretization: None,
            },
            ref_count: 0,
        }
    }

    pub fn concretized(class: Arc<ClassInfo>, args: Vec<Type>) -> Result<Type, SynthesisError> {
        if class.type_params.len() != args.len() {
            return Err(SynthesisError::GenericTypeVariableMismatch {
                type_name: class.name.clone(),
                expected: class.type_params.len(),
                actual: args.len(),
            });
        }
        if args.is_empty() {
            return Ok(Type::class(class));
        }
        let subst = class
            .type_params
            .iter()
            .map(|p| p.name.clone())
            .zip(args)
            .collect();
        Ok(Type {
            kind: TypeKind::Class {
                class,
                concretization: Some(subst),
            },
            ref_count: 0,
        })
    }

    pub fn array(elem: Type) -> Type {
        Type {
            kind: TypeKind::Array(Box::new(elem)),
            ref_count: 0,
        }
    }

    pub fn named(name: &str, resolver: &dyn TypeResolver) -> Result<Type, SynthesisError> {
        Ok(Type::class(resolver.resolve(name)?))
    }

    pub fn object(resolver: &dyn TypeResolver) -> Result<Type, SynthesisError> {
        Type::named(OBJECT, resolver)
    }

    /// Resolves a type expression; type variables and placeholders are looked
    /// up in `subst` and default to `Object`.
    pub fn from_expr(
        expr: &TypeExpr,
        subst: &Subst,
        resolver: &dyn TypeResolver,
    ) -> Result<Type, SynthesisError> {
        match expr {
            TypeExpr::Primitive(p) => Ok(Type::primitive(*p)),
            TypeExpr::Class { name, args } => {
                let class = resolver.resolve(name)?;
                if args.is_empty() {
                    return Ok(Type::class(class));
                }
                let args = args
                    .iter()
                    .map(|a| Type::from_expr(a, subst, resolver))
                    .collect::<Result<Vec<_>, _>>()?;
                Type::concretized(class, args)
            }
            TypeExpr::Var(name) | TypeExpr::Placeholder(name) => match subst.get(name) {
                Some(t) => Ok(t.clone().fresh()),
                None => Type::object(resolver),
            },
            TypeExpr::Wildcard(Some(bound)) => Type::from_expr(bound, subst, resolver),
            TypeExpr::Wildcard(None) => Type::object(resolver),
            // the bound itself is the narrowest type such a position accepts
            TypeExpr::SuperWildcard(bound) => Type::from_expr(bound, subst, resolver),
            TypeExpr::Array(elem) => Ok(Type::array(Type::from_expr(elem, subst, resolver)?)),
        }
    }

    /// The type a free parameter falls back to: its first bound when that
    /// bound is closed, the bound's raw class otherwise, `Object` if unbounded.
    pub fn bound_of(param: &TypeParam, resolver: &dyn TypeResolver) -> Result<Type, SynthesisError> {
        match param.bounds.first() {
            Some(bound) if !bound.is_open() => Type::from_expr(bound, &Subst::new(), resolver),
            Some(TypeExpr::Class { name, .. }) => Type::named(name, resolver),
            _ => Type::object(resolver),
        }
    }

    fn fresh(mut self) -> Type {
        self.ref_count = 0;
        self
    }

    pub fn ref_count(&self) -> u32 {
        self.ref_count
    }

    pub fn bump(&mut self) {
        self.ref_count += 1;
    }

    pub fn class_info(&self) -> Option<&Arc<ClassInfo>> {
        match &self.kind {
            TypeKind::Class { class, .. } => Some(class),
            _ => None,
        }
    }

    pub fn as_primitive(&self) -> Option<Primitive> {
        match &self.kind {
            TypeKind::Primitive(p) => Some(*p),
            _ => None,
        }
    }

    pub fn concretization(&self) -> Option<&Subst> {
        match &self.kind {
            TypeKind::Class { concretization, .. } => concretization.as_ref(),
            _ => None,
        }
    }

    pub fn is_void(&self) -> bool {
        self.as_primitive() == Some(Primitive::Void)
    }

    pub fn is_reference(&self) -> bool {
        !matches!(self.kind, TypeKind::Primitive(_))
    }

    /// `boolean` or `java.lang.Boolean`.
    pub fn is_boolean(&self) -> bool {
        match &self.kind {
            TypeKind::Primitive(p) => *p == Primitive::Boolean,
            TypeKind::Class { class, .. } => class.name == "java.lang.Boolean",
            TypeKind::Array(_) => false,
        }
    }

    /// A generic class whose parameters are not bound yet.
    pub fn is_free_generic(&self) -> bool {
        match &self.kind {
            TypeKind::Class {
                class,
                concretization,
            } => class.is_generic() && concretization.is_none(),
            _ => false,
        }
    }

    /// Fully qualified name, without type arguments.
    pub fn name(&self) -> String {
        match &self.kind {
            TypeKind::Primitive(p) => p.name().to_string(),
            TypeKind::Class { class, .. } => class.name.clone(),
            TypeKind::Array(elem) => format!("{}[]", elem.name()),
        }
    }

    /// Java source text using simple names.
    pub fn render(&self) -> String {
        self.render_with(&BTreeSet::new())
    }

    /// Java source text using simple names, except for classes whose import
    /// name is in `qualified`, which are written in full.
    pub fn render_with(&self, qualified: &BTreeSet<String>) -> String {
        match &self.kind {
            TypeKind::Primitive(p) => p.name().to_string(),
            TypeKind::Class {
                class,
                concretization,
            } => {
                let mut out = if qualified.contains(import_name(&class.name)) {
                    class.name.replace('$', ".")
                } else {
                    class.simple_name()
                };
                if let Some(subst) = concretization {
                    let args: Vec<String> = class
                        .type_params
                        .iter()
                        .filter_map(|p| subst.get(&p.name))
                        .map(|t| t.boxed_render(qualified))
                        .collect();
                    out.push('<');
                    out.push_str(&args.join(", "));
                    out.push('>');
                }
                out
            }
            TypeKind::Array(elem) => format!("{}[]", elem.render_with(qualified)),
        }
    }

    // primitives can't be type arguments
    fn boxed_render(&self, qualified: &BTreeSet<String>) -> String {
        match &self.kind {
            TypeKind::Primitive(p) => match p.boxed() {
                Some(boxed) if qualified.contains(boxed) => boxed.to_string(),
                Some(boxed) => simple_name(boxed),
                None => p.name().to_string(),
            },
            _ => self.render_with(qualified),
        }
    }

    /// Every class this type mentions, as import names.
    pub fn referenced_classes(&self, out: &mut BTreeSet<String>) {
        match &self.kind {
            TypeKind::Primitive(_) => {}
            TypeKind::Class {
                class,
                concretization,
            } => {
                out.insert(import_name(&class.name).to_string());
                if let Some(subst) = concretization {
                    subst.values().for_each(|t| t.referenced_classes(out));
                }
            }
            TypeKind::Array(elem) => elem.referenced_classes(out),
        }
    }

    /// Stem for generated variable names: `fileReader`, `ioException`, `i`.
    pub fn var_prefix(&self) -> String {
        match &self.kind {
            TypeKind::Primitive(p) => p.name()[..1].to_string(),
            TypeKind::Class { class, .. } => lower_camel(&class.simple_name().replace('.', "")),
            TypeKind::Array(elem) => format!("{}s", elem.var_prefix()),
        }
    }

    /// Parameter bindings visible inside this type's members; free
    /// parameters fall back to their bounds.
    pub fn member_subst(&self, resolver: &dyn TypeResolver) -> Subst {
        let mut subst = Subst::new();
        if let TypeKind::Class {
            class,
            concretization,
        } = &self.kind
        {
            for p in &class.type_params {
                let bound = concretization
                    .as_ref()
                    .and_then(|c| c.get(&p.name).cloned())
                    .or_else(|| Type::bound_of(p, resolver).ok());
                if let Some(t) = bound {
                    subst.insert(p.name.clone(), t);
                }
            }
        }
        subst
    }

    /// This type viewed as its supertype `sup`, with type arguments carried
    /// through `extends`/`implements` clauses.
    pub fn as_supertype(&self, sup: &str, resolver: &dyn TypeResolver) -> Option<Type> {
        let class = self.class_info()?;
        if class.name == sup {
            return Some(self.clone());
        }
        if !resolver.is_subclass(&class.name, sup) {
            return None;
        }
        let free = self.is_free_generic();
        let subst = self.concretization().cloned().unwrap_or_default();
        for expr in class.supertypes() {
            let parent = match expr {
                TypeExpr::Class { name, .. } if free || expr.is_open() && subst.is_empty() => {
                    Type::named(name, resolver)
                }
                _ => Type::from_expr(expr, &subst, resolver),
            };
            if let Some(view) = parent.ok().and_then(|p| p.as_supertype(sup, resolver)) {
                return Some(view);
            }
        }
        if sup == OBJECT {
            return Type::object(resolver).ok();
        }
        None
    }

    /// Assignment compatibility. Type arguments compare invariantly; a free
    /// target accepts any parameterization of its class.
    pub fn is_assignable_to(&self, target: &Type, resolver: &dyn TypeResolver) -> bool {
        match (&self.kind, &target.kind) {
            (TypeKind::Primitive(a), TypeKind::Primitive(b)) => {
                *a != Primitive::Void && a.widens_to(b)
            }
            (TypeKind::Primitive(a), TypeKind::Class { .. }) => a
                .boxed()
                .and_then(|boxed| Type::named(boxed, resolver).ok())
                .map_or(false, |boxed| boxed.is_assignable_to(target, resolver)),
            (TypeKind::Class { class, .. }, TypeKind::Primitive(p)) => {
                Primitive::unboxed(&class.name).map_or(false, |u| u.widens_to(p))
            }
            (TypeKind::Class { .. }, TypeKind::Class { class: tc, concretization: targs }) => {
                let view = match self.as_supertype(&tc.name, resolver) {
                    Some(view) => view,
                    None => return false,
                };
                match (view.concretization(), targs) {
                    (_, None) => true,
                    (None, Some(_)) => false,
                    (Some(have), Some(want)) => tc
                        .type_params
                        .iter()
                        .all(|p| have.get(&p.name) == want.get(&p.name)),
                }
            }
            (TypeKind::Array(a), TypeKind::Array(b)) => a == b,
            (TypeKind::Array(_), TypeKind::Class { class, .. }) => class.name == OBJECT,
            _ => false,
        }
    }

    fn bind(
        &self,
        view: &Type,
        method: &MethodInfo,
        resolver: &dyn TypeResolver,
    ) -> Result<BoundMember, SynthesisError> {
        let mut subst = view.member_subst(resolver);
        for p in &method.type_params {
            subst.insert(p.name.clone(), Type::bound_of(p, resolver)?);
        }
        let params = method
            .params
            .iter()
            .map(|p| Type::from_expr(p, &subst, resolver))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(BoundMember {
            name: method.name.clone(),
            owner: view.name(),
            params,
            returns: Type::from_expr(&method.returns, &subst, resolver)?,
            throws: checked(&method.throws, resolver),
            is_static: method.modifiers.is_static,
            is_constructor: false,
        })
    }

    /// Binds one declared method of `owner` (a supertype of this type, or
    /// this type itself) against this type's parameterization.
    pub fn bind_method(
        &self,
        owner: &str,
        method: &MethodInfo,
        resolver: &dyn TypeResolver,
    ) -> Result<BoundMember, SynthesisError> {
        let view = self
            .as_supertype(owner, resolver)
            .ok_or_else(|| SynthesisError::MethodOrConstructorNotFound {
                signature: format!("{}.{}", owner, method.name),
            })?;
        self.bind(&view, method, resolver)
    }

    /// Public methods visible on this type, most derived declaration first.
    /// Members whose types cannot be resolved are skipped.
    pub fn methods(&self, resolver: &dyn TypeResolver) -> Vec<BoundMember> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut visited = HashSet::new();
        self.collect_methods(self, resolver, &mut seen, &mut visited, &mut out);
        out
    }

    fn collect_methods(
        &self,
        view: &Type,
        resolver: &dyn TypeResolver,
        seen: &mut HashSet<String>,
        visited: &mut HashSet<String>,
        out: &mut Vec<BoundMember>,
    ) {
        let class = match view.class_info() {
            Some(class) => class.clone(),
            None => return,
        };
        if !visited.insert(class.name.clone()) {
            return;
        }
        for m in class.methods.iter().filter(|m| m.modifiers.public) {
            let key = format!("{}/{:?}", m.name, m.params);
            if !seen.insert(key) {
                continue;
            }
            match self.bind(view, m, resolver) {
                Ok(bound) => out.push(bound),
                Err(e) => log::debug!("skipping {}.{}: {}", class.name, m.name, e),
            }
        }
        for sup in class.supertypes() {
            if let TypeExpr::Class { name, .. } = sup {
                if let Some(parent) = view.as_supertype(name, resolver) {
                    self.collect_methods(&parent, resolver, seen, visited, out);
                }
            }
        }
        if class.superclass.is_none() && class.name != OBJECT {
            if let Ok(object) = Type::object(resolver) {
                self.collect_methods(&object, resolver, seen, visited, out);
            }
        }
    }

    /// Binds one declared constructor against this type's parameterization.
    pub fn bind_constructor(
        &self,
        ctor: &ConstructorInfo,
        resolver: &dyn TypeResolver,
    ) -> Result<BoundMember, SynthesisError> {
        let class = self
            .class_info()
            .ok_or_else(|| SynthesisError::MethodOrConstructorNotFound {
                signature: format!("new {}", self.name()),
            })?;
        let subst = self.member_subst(resolver);
        let params = ctor
            .params
            .iter()
            .map(|p| Type::from_expr(p, &subst, resolver))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(BoundMember {
            name: class.name.clone(),
            owner: class.name.clone(),
            params,
            returns: self.clone().fresh(),
            throws: checked(&ctor.throws, resolver),
            is_static: false,
            is_constructor: true,
        })
    }

    /// Public constructors of an instantiable class.
    pub fn constructors(&self, resolver: &dyn TypeResolver) -> Vec<BoundMember> {
        let class = match self.class_info() {
            Some(class) if class.is_instantiable() => class,
            _ => return Vec::new(),
        };
        class
            .constructors
            .iter()
            .filter(|c| c.modifiers.public)
            .filter_map(|c| match self.bind_constructor(c, resolver) {
                Ok(bound) => Some(bound),
                Err(e) => {
                    log::debug!("skipping constructor of {}: {}", class.name, e);
                    None
                }
            })
            .collect()
    }

    /// Public static methods declared by this class that return something
    /// assignable to this type.
    pub fn static_factories(&self, resolver: &dyn TypeResolver) -> Vec<BoundMember> {
        let class = match self.class_info() {
            Some(class) => class,
            None => return Vec::new(),
        };
        class
            .methods
            .iter()
            .filter(|m| m.modifiers.public && m.modifiers.is_static)
            .filter_map(|m| self.bind(self, m, resolver).ok())
            .filter(|b| b.returns.is_assignable_to(self, resolver))
            .collect()
    }

    /// The single abstract method, when this is a functional interface.
    pub fn functional_method(&self, resolver: &dyn TypeResolver) -> Option<BoundMember> {
        let class = self.class_info()?;
        if !class.modifiers.interface {
            return None;
        }
        let mut abstract_methods = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![class.clone()];
        while let Some(c) = stack.pop() {
            if !seen.insert(c.name.clone()) {
                continue;
            }
            for m in &c.methods {
                if m.is_abstract(c.modifiers.interface) && !OBJECT_METHODS.contains(&m.name.as_str())
                {
                    abstract_methods.push((c.name.clone(), m.clone()));
                }
            }
            for sup in c.interfaces.iter() {
                if let TypeExpr::Class { name, .. } = sup {
                    if let Ok(parent) = resolver.resolve(name) {
                        stack.push(parent);
                    }
                }
            }
        }
        match abstract_methods.as_slice() {
            [(owner, m)] => self.bind_method(owner, m, resolver).ok(),
            _ => None,
        }
    }
}

fn checked(throws: &[String], resolver: &dyn TypeResolver) -> Vec<String> {
    throws
        .iter()
        .filter(|t| resolver.is_checked_exception(t))
        .cloned()
        .collect()
}

/// `FileReader` → `fileReader`, `IOException` → `ioException`, `URL` → `url`.
pub fn lower_camel(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let upper_run = chars.iter().take_while(|c| c.is_uppercase()).count();
    let lower_upto = match upper_run {
        0 => 0,
        n if n == chars.len() => n,
        1 => 1,
        n => n - 1,
    };
    chars
        .iter()
        .enumerate()
        .map(|(i, c)| {
            if i < lower_upto {
                c.to_lowercase().next().unwrap_or(*c)
            } else {
                *c
            }
        })
        .collect()
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

impl Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.kind {
            TypeKind::Class {
                class,
                concretization: Some(subst),
            } => write!(f, "{}{:?}", class.name, subst),
            _ => write!(f, "{}", self.name()),
        }
    }
}
