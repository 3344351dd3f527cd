//! Module configuration wire formats.
//!
//! Hosts describe their modules in one of two shapes:
//! * the ordered array form `[[name, constants?, methods?, asyncIds?], ...]`,
//!   indexed by module id, where `constants` is present iff the second field is
//!   not itself an array;
//! * the legacy name-keyed form
//!   `{ name: { moduleID, constants?, methods?: { name: { methodID, type } } } }`.
//!
//! Both decode into [`ModuleConfig`]. The legacy form is normalized into the
//! array form first so ids line up whichever shape the host sent.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{ConfigError, WireResult};

pub type ModuleId = u32;
pub type MethodId = u32;

/// Upper bound (exclusive) on module and method ids accepted from a host.
pub const MAX_TABLE_LEN: u64 = 1 << 16;

/// Calling convention a host declares for a method.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MethodType {
    /// Fire-and-forget call with optional trailing failure/success callbacks.
    #[default]
    Remote,
    /// Call answered through a resolve/reject callback pair.
    RemoteAsync,
}

impl MethodType {
    pub fn as_str(self) -> &'static str {
        match self {
            MethodType::Remote => "remote",
            MethodType::RemoteAsync => "remoteAsync",
        }
    }
}

/// One module as declared by the host.
#[derive(Clone, Debug, PartialEq)]
pub struct ModuleSpec {
    pub name: String,
    pub constants: Option<Map<String, Value>>,
    /// Method names indexed by method id. `None` marks an unused id.
    pub methods: Vec<Option<String>>,
    pub async_methods: BTreeSet<MethodId>,
}

impl ModuleSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            constants: None,
            methods: Vec::new(),
            async_methods: BTreeSet::new(),
        }
    }

    pub fn with_constants(mut self, constants: Map<String, Value>) -> Self {
        self.constants = Some(constants);
        self
    }

    /// Appends a method at the next free method id.
    pub fn with_method(mut self, name: impl Into<String>, kind: MethodType) -> Self {
        let id = self.methods.len() as MethodId;
        self.methods.push(Some(name.into()));
        if kind == MethodType::RemoteAsync {
            self.async_methods.insert(id);
        }
        self
    }

    pub fn method_name(&self, id: MethodId) -> Option<&str> {
        self.methods.get(id as usize)?.as_deref()
    }

    pub fn method_type(&self, id: MethodId) -> Option<MethodType> {
        self.method_name(id)?;
        Some(if self.async_methods.contains(&id) {
            MethodType::RemoteAsync
        } else {
            MethodType::Remote
        })
    }

    fn to_value(&self) -> Value {
        let mut fields = vec![Value::String(self.name.clone())];
        if let Some(constants) = &self.constants {
            fields.push(Value::Object(constants.clone()));
        }
        if !self.methods.is_empty() {
            fields.push(Value::Array(
                self.methods
                    .iter()
                    .map(|name| name.clone().map_or(Value::Null, Value::String))
                    .collect(),
            ));
            if !self.async_methods.is_empty() {
                fields.push(Value::Array(
                    self.async_methods.iter().map(|id| Value::from(*id)).collect(),
                ));
            }
        }
        Value::Array(fields)
    }
}

/// Decoded module table, indexed by module id. Holes are `None`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModuleConfig {
    modules: Vec<Option<ModuleSpec>>,
}

impl ModuleConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a module at the next free module id and returns that id.
    pub fn push(&mut self, spec: ModuleSpec) -> ModuleId {
        self.modules.push(Some(spec));
        (self.modules.len() - 1) as ModuleId
    }

    /// Decodes either wire shape.
    pub fn from_value(value: &Value) -> Result<Self, ConfigError> {
        match value {
            Value::Array(entries) => decode_array(entries),
            Value::Object(map) => decode_legacy(map),
            _ => Err(ConfigError::NotAConfig),
        }
    }

    pub fn from_json_str(json: &str) -> WireResult<Self> {
        let value: Value = serde_json::from_str(json)?;
        Ok(Self::from_value(&value)?)
    }

    /// Encodes the array form.
    pub fn to_value(&self) -> Value {
        Value::Array(
            self.modules
                .iter()
                .map(|module| module.as_ref().map_or(Value::Null, ModuleSpec::to_value))
                .collect(),
        )
    }

    /// Encodes the legacy name-keyed form understood by older hosts.
    ///
    /// Trailing unused method ids have no representation in this shape and are
    /// dropped.
    pub fn to_legacy_value(&self) -> Value {
        let mut out = Map::new();
        for (id, spec) in self.iter() {
            let mut module = Map::new();
            module.insert("moduleID".to_owned(), Value::from(id));
            if let Some(constants) = &spec.constants {
                module.insert("constants".to_owned(), Value::Object(constants.clone()));
            }
            let mut methods = Map::new();
            for (method_id, name) in spec.methods.iter().enumerate() {
                let Some(name) = name else { continue };
                let kind = spec
                    .method_type(method_id as MethodId)
                    .unwrap_or_default();
                let mut method = Map::new();
                method.insert("methodID".to_owned(), Value::from(method_id as u64));
                method.insert("type".to_owned(), Value::from(kind.as_str()));
                methods.insert(name.clone(), Value::Object(method));
            }
            if !methods.is_empty() {
                module.insert("methods".to_owned(), Value::Object(methods));
            }
            out.insert(spec.name.clone(), Value::Object(module));
        }
        Value::Object(out)
    }

    /// Number of module id slots, holes included.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.iter().all(Option::is_none)
    }

    pub fn get(&self, id: ModuleId) -> Option<&ModuleSpec> {
        self.modules.get(id as usize)?.as_ref()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ModuleId, &ModuleSpec)> {
        self.modules
            .iter()
            .enumerate()
            .filter_map(|(id, module)| module.as_ref().map(|spec| (id as ModuleId, spec)))
    }
}

impl<'de> Deserialize<'de> for ModuleConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        ModuleConfig::from_value(&value).map_err(serde::de::Error::custom)
    }
}

impl Serialize for ModuleConfig {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_value().serialize(serializer)
    }
}

fn table_id(raw: u64) -> Result<u32, ConfigError> {
    if raw >= MAX_TABLE_LEN {
        return Err(ConfigError::IdOutOfRange(raw));
    }
    Ok(raw as u32)
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn decode_array(entries: &[Value]) -> Result<ModuleConfig, ConfigError> {
    let mut modules = Vec::with_capacity(entries.len());
    let mut names = HashSet::new();
    for (idx, entry) in entries.iter().enumerate() {
        let id = table_id(idx as u64)?;
        if entry.is_null() {
            modules.push(None);
            continue;
        }
        let spec = decode_tuple(id, entry)?;
        if !names.insert(spec.name.clone()) {
            return Err(ConfigError::DuplicateModuleName(spec.name));
        }
        modules.push(Some(spec));
    }
    Ok(ModuleConfig { modules })
}

fn decode_tuple(module: ModuleId, entry: &Value) -> Result<ModuleSpec, ConfigError> {
    let fields = entry.as_array().ok_or(ConfigError::NotATuple {
        module,
        found: kind_of(entry),
    })?;
    if fields.is_empty() || fields.len() > 4 {
        return Err(ConfigError::WrongArity {
            module,
            len: fields.len(),
        });
    }

    let name = fields[0]
        .as_str()
        .ok_or(ConfigError::InvalidName { module })?
        .to_owned();

    // Constants are present iff the second field is not itself an array.
    let rest = &fields[1..];
    let (constants, rest) = match rest.split_first() {
        Some((first, tail)) if !first.is_array() => (decode_constants(module, first)?, tail),
        _ => (None, rest),
    };
    if rest.len() > 2 {
        return Err(ConfigError::WrongArity {
            module,
            len: fields.len(),
        });
    }

    let methods = match rest.first() {
        Some(value) => decode_method_names(module, value)?,
        None => Vec::new(),
    };
    let async_methods = match rest.get(1) {
        Some(value) => decode_async_ids(module, value, &methods)?,
        None => BTreeSet::new(),
    };

    Ok(ModuleSpec {
        name,
        constants,
        methods,
        async_methods,
    })
}

fn decode_constants(
    module: ModuleId,
    value: &Value,
) -> Result<Option<Map<String, Value>>, ConfigError> {
    match value {
        Value::Null => Ok(None),
        Value::Object(map) => Ok(Some(map.clone())),
        _ => Err(ConfigError::InvalidConstants { module }),
    }
}

fn decode_method_names(
    module: ModuleId,
    value: &Value,
) -> Result<Vec<Option<String>>, ConfigError> {
    let entries = value
        .as_array()
        .ok_or(ConfigError::MethodsNotArray { module })?;
    table_id(entries.len() as u64)?;

    let mut seen = HashSet::new();
    let mut methods = Vec::with_capacity(entries.len());
    for (method, entry) in entries.iter().enumerate() {
        match entry {
            Value::Null => methods.push(None),
            Value::String(name) => {
                if !seen.insert(name.as_str()) {
                    return Err(ConfigError::DuplicateMethodName {
                        module,
                        name: name.clone(),
                    });
                }
                methods.push(Some(name.clone()));
            }
            _ => return Err(ConfigError::InvalidMethodName { module, method }),
        }
    }
    Ok(methods)
}

fn decode_async_ids(
    module: ModuleId,
    value: &Value,
    methods: &[Option<String>],
) -> Result<BTreeSet<MethodId>, ConfigError> {
    let invalid = |value: &Value| ConfigError::InvalidAsyncMethod {
        module,
        value: value.to_string(),
    };
    let entries = value.as_array().ok_or_else(|| invalid(value))?;
    let mut ids = BTreeSet::new();
    for entry in entries {
        let id = entry
            .as_u64()
            .filter(|id| matches!(methods.get(*id as usize), Some(Some(_))))
            .ok_or_else(|| invalid(entry))?;
        ids.insert(id as MethodId);
    }
    Ok(ids)
}

#[derive(Deserialize)]
struct LegacyModule {
    #[serde(rename = "moduleID")]
    module_id: u64,
    #[serde(default)]
    constants: Option<Map<String, Value>>,
    #[serde(default)]
    methods: Option<BTreeMap<String, LegacyMethod>>,
}

#[derive(Deserialize)]
struct LegacyMethod {
    #[serde(rename = "methodID")]
    method_id: u64,
    #[serde(rename = "type", default)]
    kind: MethodType,
}

fn decode_legacy(map: &Map<String, Value>) -> Result<ModuleConfig, ConfigError> {
    let mut slots: BTreeMap<ModuleId, ModuleSpec> = BTreeMap::new();

    for (name, raw) in map {
        let legacy =
            LegacyModule::deserialize(raw).map_err(|err| ConfigError::legacy(name, err))?;
        let id = table_id(legacy.module_id)?;

        let mut methods: Vec<Option<String>> = Vec::new();
        let mut async_methods = BTreeSet::new();
        for (method_name, method) in legacy.methods.unwrap_or_default() {
            let method_id = table_id(method.method_id)?;
            let idx = method_id as usize;
            if methods.len() <= idx {
                methods.resize(idx + 1, None);
            }
            if methods[idx].is_some() {
                return Err(ConfigError::DuplicateMethodId {
                    module: name.clone(),
                    method: method_id,
                });
            }
            methods[idx] = Some(method_name);
            if method.kind == MethodType::RemoteAsync {
                async_methods.insert(method_id);
            }
        }

        let spec = ModuleSpec {
            name: name.clone(),
            constants: legacy.constants,
            methods,
            async_methods,
        };
        if slots.insert(id, spec).is_some() {
            return Err(ConfigError::DuplicateModuleId(id));
        }
    }

    let len = slots.keys().next_back().map_or(0, |id| *id as usize + 1);
    let mut modules = vec![None; len];
    for (id, spec) in slots {
        modules[id as usize] = Some(spec);
    }
    Ok(ModuleConfig { modules })
}
