//! model/types.rs
//! Schema (`Model`) and record values.
//!
//! A `Model` is built once through `ModelBuilder` and is read-only afterwards; every
//! encode task borrows the same instance. Records are plain owned values, borrowed
//! for the duration of a write.

use std::collections::HashMap;

use thiserror::Error;

// ============================================================
// Schema
// ============================================================

/// Declared kind of a structural property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyKind {
    Boolean,
    Int32,
    Int64,
    Double,
    String,
    /// Qualified name of an enum type.
    Enum(String),
    /// Qualified name of a complex type.
    Complex(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDef {
    pub name: String,
    pub kind: PropertyKind,
    pub nullable: bool,
}

impl PropertyDef {
    pub fn new(name: impl Into<String>, kind: PropertyKind) -> Self {
        Self { name: name.into(), kind, nullable: true }
    }

    pub fn required(name: impl Into<String>, kind: PropertyKind) -> Self {
        Self { name: name.into(), kind, nullable: false }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityType {
    pub name: String,
    pub base: Option<String>,
    pub properties: Vec<PropertyDef>,
}

impl EntityType {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), base: None, properties: Vec::new() }
    }

    pub fn derived_from(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    pub fn property(mut self, def: PropertyDef) -> Self {
        self.properties.push(def);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplexType {
    pub name: String,
    pub properties: Vec<PropertyDef>,
}

impl ComplexType {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), properties: Vec::new() }
    }

    pub fn property(mut self, def: PropertyDef) -> Self {
        self.properties.push(def);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumType {
    pub name: String,
    pub members: Vec<String>,
}

impl EnumType {
    pub fn new<I, S>(name: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { name: name.into(), members: members.into_iter().map(Into::into).collect() }
    }

    pub fn has_member(&self, member: &str) -> bool {
        self.members.iter().any(|m| m == member)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("duplicate type name: {0}")]
    DuplicateType(String),
    #[error("type {owner} references unknown type {missing}")]
    UnknownType { owner: String, missing: String },
    #[error("entity type {0} has a cyclic base type chain")]
    CyclicBase(String),
    #[error("entity set {set} has no entity type")]
    MissingEntitySet { set: String },
    #[error("duplicate property {property} on {owner}")]
    DuplicateProperty { owner: String, property: String },
}

/// Immutable schema of one entity-set feed.
#[derive(Debug, Clone)]
pub struct Model {
    service_root: String,
    entity_set: String,
    entity_type: String,
    entity_types: HashMap<String, EntityType>,
    complex_types: HashMap<String, ComplexType>,
    enum_types: HashMap<String, EnumType>,
}

impl Model {
    pub fn builder(service_root: impl Into<String>) -> ModelBuilder {
        ModelBuilder {
            service_root: service_root.into(),
            entity_set: None,
            entity_types: Vec::new(),
            complex_types: Vec::new(),
            enum_types: Vec::new(),
        }
    }

    pub fn service_root(&self) -> &str {
        &self.service_root
    }

    pub fn entity_set(&self) -> &str {
        &self.entity_set
    }

    /// Declared entity type of the feed's entity set.
    pub fn set_type(&self) -> &EntityType {
        // Presence is checked by `ModelBuilder::build`.
        &self.entity_types[&self.entity_type]
    }

    /// Context URL written into the start marker.
    pub fn context_url(&self) -> String {
        format!("{}$metadata#{}", self.service_root, self.entity_set)
    }

    pub fn entity_type(&self, name: &str) -> Option<&EntityType> {
        self.entity_types.get(name)
    }

    pub fn complex_type(&self, name: &str) -> Option<&ComplexType> {
        self.complex_types.get(name)
    }

    pub fn enum_type(&self, name: &str) -> Option<&EnumType> {
        self.enum_types.get(name)
    }

    /// True if `name` is the set's entity type or derives from it.
    pub fn is_assignable_to_set(&self, name: &str) -> bool {
        let mut current = self.entity_types.get(name);
        while let Some(ty) = current {
            if ty.name == self.entity_type {
                return true;
            }
            current = ty.base.as_deref().and_then(|b| self.entity_types.get(b));
        }
        false
    }

    /// Find a property declared on `type_name` or any of its base types.
    pub fn find_property(&self, type_name: &str, property: &str) -> Option<&PropertyDef> {
        let mut current = self.entity_types.get(type_name);
        while let Some(ty) = current {
            if let Some(def) = ty.properties.iter().find(|p| p.name == property) {
                return Some(def);
            }
            current = ty.base.as_deref().and_then(|b| self.entity_types.get(b));
        }
        None
    }

    /// All properties of an entity type, base-first.
    pub fn all_properties(&self, type_name: &str) -> Vec<&PropertyDef> {
        let mut chain = Vec::new();
        let mut current = self.entity_types.get(type_name);
        while let Some(ty) = current {
            chain.push(ty);
            current = ty.base.as_deref().and_then(|b| self.entity_types.get(b));
        }
        chain.iter().rev().flat_map(|ty| ty.properties.iter()).collect()
    }
}

pub struct ModelBuilder {
    service_root: String,
    entity_set: Option<(String, String)>,
    entity_types: Vec<EntityType>,
    complex_types: Vec<ComplexType>,
    enum_types: Vec<EnumType>,
}

impl ModelBuilder {
    pub fn entity_type(mut self, ty: EntityType) -> Self {
        self.entity_types.push(ty);
        self
    }

    pub fn complex_type(mut self, ty: ComplexType) -> Self {
        self.complex_types.push(ty);
        self
    }

    pub fn enum_type(mut self, ty: EnumType) -> Self {
        self.enum_types.push(ty);
        self
    }

    pub fn entity_set(mut self, name: impl Into<String>, entity_type: impl Into<String>) -> Self {
        self.entity_set = Some((name.into(), entity_type.into()));
        self
    }

    /// Resolve every type reference and freeze the schema.
    pub fn build(self) -> Result<Model, ModelError> {
        let mut entity_types = HashMap::new();
        let mut complex_types = HashMap::new();
        let mut enum_types = HashMap::new();

        for ty in self.entity_types {
            check_unique_properties(&ty.name, &ty.properties)?;
            let name = ty.name.clone();
            if entity_types.insert(name.clone(), ty).is_some() {
                return Err(ModelError::DuplicateType(name));
            }
        }
        for ty in self.complex_types {
            check_unique_properties(&ty.name, &ty.properties)?;
            let name = ty.name.clone();
            if entity_types.contains_key(&name) || complex_types.insert(name.clone(), ty).is_some() {
                return Err(ModelError::DuplicateType(name));
            }
        }
        for ty in self.enum_types {
            let name = ty.name.clone();
            if entity_types.contains_key(&name)
                || complex_types.contains_key(&name)
                || enum_types.insert(name.clone(), ty).is_some()
            {
                return Err(ModelError::DuplicateType(name));
            }
        }

        let check_kind = |owner: &str, def: &PropertyDef| -> Result<(), ModelError> {
            let missing = match &def.kind {
                PropertyKind::Enum(n) if !enum_types.contains_key(n) => Some(n),
                PropertyKind::Complex(n) if !complex_types.contains_key(n) => Some(n),
                _ => None,
            };
            match missing {
                Some(n) => Err(ModelError::UnknownType { owner: owner.to_owned(), missing: n.clone() }),
                None => Ok(()),
            }
        };

        for ty in entity_types.values() {
            for def in &ty.properties {
                check_kind(&ty.name, def)?;
            }
            // Walk the base chain; a chain longer than the type count is a cycle.
            let mut base = ty.base.as_deref();
            let mut steps = 0;
            while let Some(b) = base {
                let parent = entity_types.get(b).ok_or_else(|| ModelError::UnknownType {
                    owner: ty.name.clone(),
                    missing: b.to_owned(),
                })?;
                steps += 1;
                if steps > entity_types.len() {
                    return Err(ModelError::CyclicBase(ty.name.clone()));
                }
                base = parent.base.as_deref();
            }
        }
        for ty in complex_types.values() {
            for def in &ty.properties {
                check_kind(&ty.name, def)?;
            }
        }

        let (entity_set, entity_type) = self
            .entity_set
            .ok_or_else(|| ModelError::MissingEntitySet { set: String::new() })?;
        if !entity_types.contains_key(&entity_type) {
            return Err(ModelError::MissingEntitySet { set: entity_set });
        }

        Ok(Model {
            service_root: self.service_root,
            entity_set,
            entity_type,
            entity_types,
            complex_types,
            enum_types,
        })
    }
}

fn check_unique_properties(owner: &str, defs: &[PropertyDef]) -> Result<(), ModelError> {
    for (i, def) in defs.iter().enumerate() {
        if defs[..i].iter().any(|d| d.name == def.name) {
            return Err(ModelError::DuplicateProperty {
                owner: owner.to_owned(),
                property: def.name.clone(),
            });
        }
    }
    Ok(())
}

// ============================================================
// Records
// ============================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    /// Enum member name; the enum type comes from the property declaration.
    Enum(String),
    Complex(ComplexValue),
}

impl Value {
    pub fn enum_member(member: impl Into<String>) -> Self {
        Value::Enum(member.into())
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Enum(_) => "enum",
            Value::Complex(_) => "complex",
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}
impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}
impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}
impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}
impl From<ComplexValue> for Value {
    fn from(v: ComplexValue) -> Self {
        Value::Complex(v)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: String,
    pub value: Value,
}

/// Instance annotation (`@term`) attached to a record or complex value.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub term: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ComplexValue {
    pub type_name: Option<String>,
    pub properties: Vec<Property>,
    pub annotations: Vec<Annotation>,
}

impl ComplexValue {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self { type_name: Some(type_name.into()), ..Default::default() }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.push(Property { name: name.into(), value: value.into() });
        self
    }

    pub fn with_annotation(mut self, term: impl Into<String>, value: impl Into<Value>) -> Self {
        self.annotations.push(Annotation { term: term.into(), value: value.into() });
        self
    }
}

/// One entity to write. Identity is its position in the submitted sequence.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    /// Set for instances of a derived type; `None` means the set's declared type.
    pub type_name: Option<String>,
    pub properties: Vec<Property>,
    pub annotations: Vec<Annotation>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of_type(type_name: impl Into<String>) -> Self {
        Self { type_name: Some(type_name.into()), ..Default::default() }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.push(Property { name: name.into(), value: value.into() });
        self
    }

    pub fn with_annotation(mut self, term: impl Into<String>, value: impl Into<Value>) -> Self {
        self.annotations.push(Annotation { term: term.into(), value: value.into() });
        self
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.iter().find(|p| p.name == name).map(|p| &p.value)
    }
}
