//! Command descriptors
//!
//! A [`Descriptor`] is the static shape of one leaf command: its name, its
//! positional arguments and its flags. Commands build one with
//! [`Descriptor::builder`], declaring each bindable field together with an
//! accessor that hands out a mutable reference to it:
//!
//! ```ignore
//! Descriptor::<Self>::builder("create")
//!     .arg("name", |c| c.name.field_ref())
//!     .flag("zone", |c| c.zone.field_ref())
//!     .short('z')
//!     .usage("instance zone")
//!     .build()
//! ```
//!
//! Modifiers (`short`, `usage`, `name`, `required`, `hidden`) apply to the
//! item declared just before them. Structural mistakes are collected by the
//! builder and reported together by [`DescriptorBuilder::build`]; the field
//! kinds are checked against a live value by [`Descriptor::check_fields`]
//! when the command is registered.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use crate::error::CliError;
use crate::words;

/// Long flag names owned by the root command.
pub const RESERVED_FLAGS: &[&str] = &[
    "output-format",
    "output-template",
    "quiet",
    "config-dir",
    "use-profile",
    "verbose",
    "help",
    "version",
];

/// Short forms owned by the root command.
pub const RESERVED_SHORTS: &[char] = &['O', 'Q', 'C', 'A', 'v', 'h', 'V'];

// ============ Bindable Fields ============

/// Mutable handle on a bindable command field.
pub enum FieldRef<'a> {
    Str(&'a mut String),
    Int(&'a mut i64),
    Bool(&'a mut bool),
    OptStr(&'a mut Option<String>),
    List(&'a mut Vec<String>),
    Map(&'a mut BTreeMap<String, String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Str,
    Int,
    Bool,
    OptStr,
    List,
    Map,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::Str => "string",
            FieldKind::Int => "integer",
            FieldKind::Bool => "boolean",
            FieldKind::OptStr => "optional string",
            FieldKind::List => "string list",
            FieldKind::Map => "string map",
        };
        f.write_str(name)
    }
}

impl FieldRef<'_> {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldRef::Str(_) => FieldKind::Str,
            FieldRef::Int(_) => FieldKind::Int,
            FieldRef::Bool(_) => FieldKind::Bool,
            FieldRef::OptStr(_) => FieldKind::OptStr,
            FieldRef::List(_) => FieldKind::List,
            FieldRef::Map(_) => FieldKind::Map,
        }
    }

    /// Address of the referenced field, used to detect double bindings.
    fn addr(&self) -> usize {
        match self {
            FieldRef::Str(v) => &**v as *const String as usize,
            FieldRef::Int(v) => &**v as *const i64 as usize,
            FieldRef::Bool(v) => &**v as *const bool as usize,
            FieldRef::OptStr(v) => &**v as *const Option<String> as usize,
            FieldRef::List(v) => &**v as *const Vec<String> as usize,
            FieldRef::Map(v) => &**v as *const BTreeMap<String, String> as usize,
        }
    }

    /// Current value in command-line form, used as the displayed default.
    pub fn current_values(&self) -> Vec<String> {
        match self {
            FieldRef::Str(v) if v.is_empty() => Vec::new(),
            FieldRef::Str(v) => vec![(**v).clone()],
            FieldRef::Int(v) => vec![v.to_string()],
            FieldRef::Bool(v) => vec![v.to_string()],
            FieldRef::OptStr(v) => v.iter().cloned().collect(),
            FieldRef::List(v) => (**v).clone(),
            FieldRef::Map(v) => v.iter().map(|(k, val)| format!("{k}={val}")).collect(),
        }
    }
}

/// Field types a command may expose as an argument or flag.
pub trait Bindable {
    fn field_ref(&mut self) -> FieldRef<'_>;
}

impl Bindable for String {
    fn field_ref(&mut self) -> FieldRef<'_> {
        FieldRef::Str(self)
    }
}

impl Bindable for i64 {
    fn field_ref(&mut self) -> FieldRef<'_> {
        FieldRef::Int(self)
    }
}

impl Bindable for bool {
    fn field_ref(&mut self) -> FieldRef<'_> {
        FieldRef::Bool(self)
    }
}

impl Bindable for Option<String> {
    fn field_ref(&mut self) -> FieldRef<'_> {
        FieldRef::OptStr(self)
    }
}

impl Bindable for Vec<String> {
    fn field_ref(&mut self) -> FieldRef<'_> {
        FieldRef::List(self)
    }
}

impl Bindable for BTreeMap<String, String> {
    fn field_ref(&mut self) -> FieldRef<'_> {
        FieldRef::Map(self)
    }
}

/// Projection from a command value to one of its fields.
pub type Accessor<C> = for<'a> fn(&'a mut C) -> FieldRef<'a>;

// ============ Descriptor ============

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Required,
    Optional,
    /// Consumes all remaining arguments; must be last.
    Repeated,
}

pub struct Positional<C> {
    pub field: &'static str,
    pub label: String,
    pub usage: Option<String>,
    pub arity: Arity,
    access: Accessor<C>,
}

impl<C> Positional<C> {
    pub fn bind<'a>(&self, cmd: &'a mut C) -> FieldRef<'a> {
        (self.access)(cmd)
    }

    /// Usage token as printed in the synopsis: `NAME`, `[NAME]`, `NAME...`.
    pub fn synopsis(&self) -> String {
        match self.arity {
            Arity::Required => self.label.clone(),
            Arity::Optional => format!("[{}]", self.label),
            Arity::Repeated => format!("{}...", self.label),
        }
    }
}

pub struct Flag<C> {
    pub field: &'static str,
    pub name: String,
    pub short: Option<char>,
    pub usage: Option<String>,
    pub required: bool,
    pub hidden: bool,
    /// Warning shown when the flag is used anyway.
    pub deprecated: Option<String>,
    access: Accessor<C>,
}

impl<C> Flag<C> {
    pub fn bind<'a>(&self, cmd: &'a mut C) -> FieldRef<'a> {
        (self.access)(cmd)
    }
}

pub struct Descriptor<C> {
    pub name: String,
    pub positionals: Vec<Positional<C>>,
    pub flags: Vec<Flag<C>>,
}

impl<C> fmt::Debug for Descriptor<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("name", &self.name)
            .field(
                "positionals",
                &self.positionals.iter().map(|p| p.synopsis()).collect::<Vec<_>>(),
            )
            .field(
                "flags",
                &self.flags.iter().map(|f| f.name.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl<C> Descriptor<C> {
    pub fn builder(name: impl Into<String>) -> DescriptorBuilder<C> {
        DescriptorBuilder {
            name: name.into(),
            positionals: Vec::new(),
            flags: Vec::new(),
            last: None,
            problems: Vec::new(),
        }
    }

    pub fn flag(&self, name: &str) -> Option<&Flag<C>> {
        self.flags.iter().find(|f| f.name == name)
    }

    /// `create NAME [flags]` style synopsis.
    pub fn synopsis(&self) -> String {
        let mut parts = vec![self.name.clone()];
        parts.extend(self.positionals.iter().map(|p| p.synopsis()));
        if !self.flags.is_empty() {
            parts.push("[flags]".into());
        }
        parts.join(" ")
    }

    /// Check field kinds and that every item binds a distinct field of `scratch`.
    pub fn check_fields(&self, scratch: &mut C) -> Result<(), CliError> {
        let mut seen = HashSet::new();

        for pos in &self.positionals {
            let field = pos.bind(scratch);
            let kind = field.kind();
            let accepted = match pos.arity {
                Arity::Required => matches!(kind, FieldKind::Str | FieldKind::Int),
                Arity::Optional => {
                    matches!(kind, FieldKind::Str | FieldKind::Int | FieldKind::OptStr)
                }
                Arity::Repeated => kind == FieldKind::List,
            };
            if !accepted {
                return Err(self.error(format!(
                    "field {:?}: a {} field cannot be bound to a {} positional argument",
                    pos.field,
                    kind,
                    match pos.arity {
                        Arity::Required => "required",
                        Arity::Optional => "optional",
                        Arity::Repeated => "repeatable",
                    }
                )));
            }
            if !seen.insert(field.addr()) {
                return Err(self.error(format!("field {:?} is bound more than once", pos.field)));
            }
        }

        for flag in &self.flags {
            let field = flag.bind(scratch);
            if !seen.insert(field.addr()) {
                return Err(self.error(format!("field {:?} is bound more than once", flag.field)));
            }
        }

        Ok(())
    }

    fn error(&self, msg: String) -> CliError {
        CliError::Descriptor(format!("command {:?}: {}", self.name, msg))
    }
}

// ============ Builder ============

#[derive(Clone, Copy)]
enum Last {
    Positional,
    Flag,
}

pub struct DescriptorBuilder<C> {
    name: String,
    positionals: Vec<Positional<C>>,
    flags: Vec<Flag<C>>,
    last: Option<Last>,
    problems: Vec<String>,
}

impl<C> DescriptorBuilder<C> {
    /// Required positional argument.
    pub fn arg(self, field: &'static str, access: Accessor<C>) -> Self {
        self.positional(field, access, Arity::Required)
    }

    pub fn optional_arg(self, field: &'static str, access: Accessor<C>) -> Self {
        self.positional(field, access, Arity::Optional)
    }

    /// Positional consuming every remaining argument.
    pub fn args(self, field: &'static str, access: Accessor<C>) -> Self {
        self.positional(field, access, Arity::Repeated)
    }

    pub fn flag(mut self, field: &'static str, access: Accessor<C>) -> Self {
        self.flags.push(Flag {
            field,
            name: words::kebab_case(field),
            short: None,
            usage: None,
            required: false,
            hidden: false,
            deprecated: None,
            access,
        });
        self.last = Some(Last::Flag);
        self
    }

    /// Untagged field: bound as a hidden flag under its derived name.
    pub fn field(self, field: &'static str, access: Accessor<C>) -> Self {
        self.flag(field, access).hidden()
    }

    pub fn short(mut self, short: char) -> Self {
        if let Some(flag) = self.last_flag() {
            flag.short = Some(short);
        } else {
            self.misuse("short");
        }
        self
    }

    pub fn usage(mut self, usage: impl Into<String>) -> Self {
        let usage = usage.into();
        match self.last {
            Some(Last::Flag) => {
                if let Some(flag) = self.flags.last_mut() {
                    flag.usage = Some(usage);
                }
            }
            Some(Last::Positional) => {
                if let Some(pos) = self.positionals.last_mut() {
                    pos.usage = Some(usage);
                }
            }
            None => self.misuse("usage"),
        }
        self
    }

    /// Override the derived flag name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        if let Some(flag) = self.last_flag() {
            flag.name = name.into();
        } else {
            self.misuse("name");
        }
        self
    }

    pub fn required(mut self) -> Self {
        if let Some(flag) = self.last_flag() {
            flag.required = true;
        } else {
            self.misuse("required");
        }
        self
    }

    pub fn hidden(mut self) -> Self {
        if let Some(flag) = self.last_flag() {
            flag.hidden = true;
        } else {
            self.misuse("hidden");
        }
        self
    }

    /// Hide the flag and warn on stderr whenever it is set on the command
    /// line. It still binds.
    pub fn deprecated(mut self, message: impl Into<String>) -> Self {
        let message = message.into();
        if let Some(flag) = self.last_flag() {
            flag.hidden = true;
            flag.deprecated = Some(message);
        } else {
            self.misuse("deprecated");
        }
        self
    }

    pub fn build(self) -> Result<Descriptor<C>, CliError> {
        let mut problems = self.problems;

        if self.name.trim().is_empty() {
            problems.push("missing command name".into());
        }

        let mut fields = HashSet::new();
        for field in self
            .positionals
            .iter()
            .map(|p| p.field)
            .chain(self.flags.iter().map(|f| f.field))
        {
            if !fields.insert(field) {
                problems.push(format!("field {field:?} is declared more than once"));
            }
        }

        let last_index = self.positionals.len().saturating_sub(1);
        let mut seen_optional = false;
        for (i, pos) in self.positionals.iter().enumerate() {
            match pos.arity {
                Arity::Repeated if i != last_index => problems.push(format!(
                    "repeatable argument {:?} must be the last positional argument",
                    pos.label
                )),
                Arity::Required | Arity::Repeated if seen_optional => problems.push(format!(
                    "required argument {:?} cannot follow an optional argument",
                    pos.label
                )),
                Arity::Optional => seen_optional = true,
                _ => {}
            }
        }

        let mut names = HashSet::new();
        let mut shorts = HashSet::new();
        for flag in &self.flags {
            if flag.name.is_empty() {
                problems.push(format!("field {:?} has an empty flag name", flag.field));
            }
            if RESERVED_FLAGS.contains(&flag.name.as_str()) {
                problems.push(format!("flag --{} is reserved", flag.name));
            }
            if !names.insert(flag.name.as_str()) {
                problems.push(format!("duplicate flag --{}", flag.name));
            }
            if let Some(short) = flag.short {
                if RESERVED_SHORTS.contains(&short) {
                    problems.push(format!("short flag -{short} is reserved"));
                }
                if !shorts.insert(short) {
                    problems.push(format!("duplicate short flag -{short}"));
                }
            }
        }

        if !problems.is_empty() {
            return Err(CliError::Descriptor(format!(
                "command {:?}: {}",
                self.name,
                problems.join("; ")
            )));
        }

        Ok(Descriptor {
            name: self.name,
            positionals: self.positionals,
            flags: self.flags,
        })
    }

    fn positional(mut self, field: &'static str, access: Accessor<C>, arity: Arity) -> Self {
        self.positionals.push(Positional {
            field,
            label: words::upper_kebab_case(field),
            usage: None,
            arity,
            access,
        });
        self.last = Some(Last::Positional);
        self
    }

    fn last_flag(&mut self) -> Option<&mut Flag<C>> {
        match self.last {
            Some(Last::Flag) => self.flags.last_mut(),
            _ => None,
        }
    }

    fn misuse(&mut self, modifier: &str) {
        let target = match self.last {
            Some(Last::Positional) => "a positional argument",
            Some(Last::Flag) | None => "nothing",
        };
        self.problems
            .push(format!("modifier {modifier:?} cannot be applied to {target}"));
    }
}
