//! Module/method registry.
//!
//! Built once per bridge from the decoded module configs. Holds the id ↔ name
//! tables for both directions and one [`MethodHandle`] per remote method.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use anyhow::{anyhow, Result};
use bridge_wire::{MethodId, MethodType, ModuleConfig, ModuleId, Target};
use serde_json::{Map, Value};

use crate::debug_ring::CallOrigin;
use crate::error::{BridgeResult, CallSite};
use crate::proxy::{MethodHandle, MethodKind};

#[derive(Clone, Debug, PartialEq, Eq)]
struct TableEntry {
    name: String,
    methods: Vec<Option<String>>,
    method_ids: HashMap<String, MethodId>,
}

/// Bidirectional id ↔ name tables for one side of the bridge.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LookupTables {
    modules: BTreeMap<ModuleId, TableEntry>,
    module_ids: HashMap<String, ModuleId>,
}

impl LookupTables {
    pub fn from_config(config: &ModuleConfig) -> Self {
        let mut tables = Self::default();
        for (id, spec) in config.iter() {
            let method_ids = spec
                .methods
                .iter()
                .enumerate()
                .filter_map(|(method_id, name)| {
                    name.as_ref().map(|name| (name.clone(), method_id as MethodId))
                })
                .collect();
            tables.module_ids.insert(spec.name.clone(), id);
            tables.modules.insert(
                id,
                TableEntry {
                    name: spec.name.clone(),
                    methods: spec.methods.clone(),
                    method_ids,
                },
            );
        }
        tables
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn module_name(&self, id: ModuleId) -> Option<&str> {
        self.modules.get(&id).map(|entry| entry.name.as_str())
    }

    pub fn module_id(&self, name: &str) -> Option<ModuleId> {
        self.module_ids.get(name).copied()
    }

    pub fn method_name(&self, module: ModuleId, method: MethodId) -> Option<&str> {
        self.modules
            .get(&module)?
            .methods
            .get(method as usize)?
            .as_deref()
    }

    pub fn method_id(&self, module: ModuleId, name: &str) -> Option<MethodId> {
        self.modules.get(&module)?.method_ids.get(name).copied()
    }

    /// Modules in id order with their method names indexed by method id.
    pub fn iter(&self) -> impl Iterator<Item = (ModuleId, &str, &[Option<String>])> {
        self.modules
            .iter()
            .map(|(id, entry)| (*id, entry.name.as_str(), entry.methods.as_slice()))
    }

    /// Resolves an incoming module/method reference to names.
    ///
    /// Numeric ids go through the tables. Names pass through untouched, so the
    /// module loader may serve modules the config never declared.
    pub fn resolve(&self, module: &Target, method: &Target) -> Result<(String, String)> {
        let module_id = match module {
            Target::Id(id) => Some(*id),
            Target::Name(name) => self.module_id(name),
        };
        let module_name = match module {
            Target::Id(id) => self
                .module_name(*id)
                .ok_or_else(|| anyhow!("unknown module id {id}"))?
                .to_owned(),
            Target::Name(name) => name.clone(),
        };
        let method_name = match method {
            Target::Name(name) => name.clone(),
            Target::Id(id) => module_id
                .and_then(|module_id| self.method_name(module_id, *id))
                .ok_or_else(|| anyhow!("unknown method id {id} on module {module_name}"))?
                .to_owned(),
        };
        Ok((module_name, method_name))
    }
}

/// Immutable description of one remote module.
#[derive(Clone, Debug, PartialEq)]
pub struct ModuleDescriptor {
    pub id: ModuleId,
    pub name: String,
    pub constants: Option<Map<String, Value>>,
    pub method_names: Vec<Option<String>>,
    pub async_method_ids: BTreeSet<MethodId>,
}

/// Generated proxy for a remote module: its constants and one handle per method.
#[derive(Clone, Debug)]
pub struct RemoteModule {
    descriptor: ModuleDescriptor,
    constants: Map<String, Value>,
    methods: BTreeMap<String, MethodHandle>,
}

impl RemoteModule {
    fn build(descriptor: ModuleDescriptor) -> Self {
        let methods = descriptor
            .method_names
            .iter()
            .enumerate()
            .filter_map(|(method_id, name)| {
                let name = name.as_ref()?;
                let method_id = method_id as MethodId;
                let kind = if descriptor.async_method_ids.contains(&method_id) {
                    MethodKind::Promise
                } else {
                    MethodKind::Sync
                };
                Some((
                    name.clone(),
                    MethodHandle::new(descriptor.id, method_id, kind),
                ))
            })
            .collect();
        let constants = descriptor.constants.clone().unwrap_or_default();
        Self {
            descriptor,
            constants,
            methods,
        }
    }

    pub fn id(&self) -> ModuleId {
        self.descriptor.id
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    pub fn constants(&self) -> &Map<String, Value> {
        &self.constants
    }

    pub fn constant(&self, key: &str) -> Option<&Value> {
        self.constants.get(key)
    }

    pub fn method(&self, name: &str) -> Option<MethodHandle> {
        self.methods.get(name).copied()
    }

    pub fn methods(&self) -> impl Iterator<Item = (&str, MethodHandle)> {
        self.methods.iter().map(|(name, handle)| (name.as_str(), *handle))
    }
}

pub struct Registry {
    remote: LookupTables,
    local: LookupTables,
    modules: BTreeMap<ModuleId, RemoteModule>,
    handles: HashMap<(ModuleId, MethodId), MethodHandle>,
}

impl Registry {
    pub fn build(remote: &ModuleConfig, local: Option<&ModuleConfig>) -> Self {
        let modules: BTreeMap<ModuleId, RemoteModule> = remote
            .iter()
            .map(|(id, spec)| {
                let descriptor = ModuleDescriptor {
                    id,
                    name: spec.name.clone(),
                    constants: spec.constants.clone(),
                    method_names: spec.methods.clone(),
                    async_method_ids: spec.async_methods.clone(),
                };
                (id, RemoteModule::build(descriptor))
            })
            .collect();
        let handles = modules
            .values()
            .flat_map(|module| module.methods())
            .map(|(_, handle)| ((handle.module_id(), handle.method_id()), handle))
            .collect();

        Self {
            remote: LookupTables::from_config(remote),
            local: local.map(LookupTables::from_config).unwrap_or_default(),
            modules,
            handles,
        }
    }

    /// Decodes raw host configs in either wire shape, then builds.
    pub fn from_values(remote: &Value, local: Option<&Value>) -> BridgeResult<Self> {
        let remote = ModuleConfig::from_value(remote)?;
        let local = local.map(ModuleConfig::from_value).transpose()?;
        Ok(Self::build(&remote, local.as_ref()))
    }

    /// Tables for calls going to the host.
    pub fn remote(&self) -> &LookupTables {
        &self.remote
    }

    /// Tables for calls arriving from the host.
    pub fn local(&self) -> &LookupTables {
        &self.local
    }

    pub fn module(&self, name: &str) -> Option<&RemoteModule> {
        let id = self.remote.module_id(name)?;
        self.modules.get(&id)
    }

    pub fn module_by_id(&self, id: ModuleId) -> Option<&RemoteModule> {
        self.modules.get(&id)
    }

    pub fn modules(&self) -> impl Iterator<Item = &RemoteModule> {
        self.modules.values()
    }

    pub fn handle(&self, module: ModuleId, method: MethodId) -> Option<MethodHandle> {
        self.handles.get(&(module, method)).copied()
    }

    pub fn method_type(&self, module: ModuleId, method: MethodId) -> Option<MethodType> {
        self.handle(module, method).map(|handle| handle.kind().into())
    }

    pub(crate) fn call_site(&self, origin: CallOrigin) -> CallSite {
        CallSite {
            module: self.remote.module_name(origin.module_id).map(str::to_owned),
            method: self
                .remote
                .method_name(origin.module_id, origin.method_id)
                .map(str::to_owned),
        }
    }
}
