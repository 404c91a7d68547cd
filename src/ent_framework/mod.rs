// Ent framework - mutation hooks run around every entity write

pub mod ent_hooks;

pub use ent_hooks::{
    create_default_hook_registry, EntHook, HookContext, HookOperation, HookRegistry, HookTiming,
};
