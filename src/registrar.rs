//! Command tree assembly and dispatch
//!
//! Groups are inner nodes, [`Command`]s are leaves. The tree is built once at
//! startup; every descriptor problem surfaces there, before any argument is
//! parsed.

use std::collections::{BTreeMap, HashSet};
use std::io::Write;

use async_trait::async_trait;
use clap::parser::ValueSource;
use clap::{Arg, ArgAction, ArgMatches};

use crate::descriptor::{Arity, Descriptor, FieldKind, FieldRef};
use crate::error::CliError;
use crate::lifecycle::{self, Command};
use crate::output;
use crate::state::Context;

pub const LIST_ALIASES: &[&str] = &["ls"];
pub const REMOVE_ALIASES: &[&str] = &["rm"];
pub const SHOW_ALIASES: &[&str] = &["get"];
pub const CREATE_ALIASES: &[&str] = &["add"];

/// Merge alias families, keeping first occurrences.
pub fn aliases(families: &[&[&'static str]]) -> Vec<&'static str> {
    let mut seen = HashSet::new();
    families
        .iter()
        .flat_map(|f| f.iter().copied())
        .filter(|a| seen.insert(*a))
        .collect()
}

// ============ Leaves ============

#[async_trait]
trait Leaf: Send + Sync {
    fn name(&self) -> &str;
    fn aliases(&self) -> &[&'static str];
    fn clap_command(&self) -> clap::Command;
    async fn invoke(&self, ctx: &Context, matches: &ArgMatches) -> Result<(), CliError>;
}

struct Registered<C: Command> {
    template: C,
    descriptor: Descriptor<C>,
    aliases: Vec<&'static str>,
}

#[async_trait]
impl<C: Command> Leaf for Registered<C> {
    fn name(&self) -> &str {
        &self.descriptor.name
    }

    fn aliases(&self) -> &[&'static str] {
        &self.aliases
    }

    fn clap_command(&self) -> clap::Command {
        let mut cmd = clap::Command::new(self.descriptor.name.clone())
            .about(C::short())
            .visible_aliases(self.aliases.clone());

        let annotations = output::template_annotations::<C::Output>();
        let mut long = C::long().map(str::to_string);
        if !annotations.is_empty() {
            let extra = format!(
                "Supported output template annotations: {}",
                annotations.join(", ")
            );
            long = Some(match long {
                Some(text) => format!("{text}\n\n{extra}"),
                None => format!("{}\n\n{extra}", C::short()),
            });
        }
        if let Some(long) = long {
            cmd = cmd.long_about(long);
        }

        let mut scratch = self.template.clone();
        for (i, pos) in self.descriptor.positionals.iter().enumerate() {
            let mut arg = Arg::new(pos.field)
                .value_name(pos.label.clone())
                .index(i + 1);
            if let Some(usage) = &pos.usage {
                arg = arg.help(usage.clone());
            }
            arg = match pos.arity {
                Arity::Required => arg.required(true),
                Arity::Optional => arg.required(false),
                Arity::Repeated => arg.required(true).num_args(1..).action(ArgAction::Append),
            };
            if matches!(pos.bind(&mut scratch), FieldRef::Int(_)) {
                arg = arg.value_parser(clap::value_parser!(i64));
            }
            cmd = cmd.arg(arg);
        }

        for flag in &self.descriptor.flags {
            let field = flag.bind(&mut scratch);
            let mut arg = Arg::new(flag.field)
                .long(flag.name.clone())
                .required(flag.required)
                .hide(flag.hidden);
            if let Some(short) = flag.short {
                arg = arg.short(short);
            }
            if let Some(usage) = &flag.usage {
                arg = arg.help(usage.clone());
            }

            let defaults = field.current_values();
            arg = match field.kind() {
                FieldKind::Str | FieldKind::OptStr => arg.action(ArgAction::Set),
                FieldKind::Int => arg
                    .action(ArgAction::Set)
                    .value_parser(clap::value_parser!(i64)),
                FieldKind::Bool => arg
                    .action(ArgAction::Set)
                    .num_args(0..=1)
                    .require_equals(true)
                    .default_missing_value("true")
                    .value_parser(clap::value_parser!(bool)),
                FieldKind::List => arg.action(ArgAction::Append).value_delimiter(','),
                FieldKind::Map => arg
                    .action(ArgAction::Append)
                    .value_name("KEY=VALUE")
                    .value_parser(parse_key_value),
            };
            if !flag.required && !defaults.is_empty() {
                arg = arg.default_values(defaults);
            }
            cmd = cmd.arg(arg);
        }

        cmd
    }

    async fn invoke(&self, ctx: &Context, matches: &ArgMatches) -> Result<(), CliError> {
        let mut cmd = self.template.clone();
        bind(&self.descriptor, &mut cmd, matches)?;
        warn_deprecated(&self.descriptor, ctx, matches)?;
        tracing::debug!(command = %self.descriptor.name, "invoking");
        lifecycle::execute(cmd, ctx).await
    }
}

fn warn_deprecated<C>(
    descriptor: &Descriptor<C>,
    ctx: &Context,
    matches: &ArgMatches,
) -> Result<(), CliError> {
    for flag in &descriptor.flags {
        let Some(message) = &flag.deprecated else {
            continue;
        };
        if matches.value_source(flag.field) == Some(ValueSource::CommandLine) {
            writeln!(
                ctx.stderr(),
                "Flag --{} has been deprecated, {message}",
                flag.name
            )?;
        }
    }
    Ok(())
}

/// `KEY=VALUE`. A lone `=` stands for an explicitly empty map.
fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.is_empty() || v.is_empty() => Ok((k.to_string(), v.to_string())),
        _ => Err(format!("invalid value {s:?}: expected KEY=VALUE")),
    }
}

fn binding_error(field: &str, err: impl std::fmt::Display) -> CliError {
    CliError::Descriptor(format!("unable to bind field {field:?}: {err}"))
}

/// Write parsed values over the bound fields of `cmd`. Fields absent from
/// `matches` keep their template value.
fn bind<C>(descriptor: &Descriptor<C>, cmd: &mut C, matches: &ArgMatches) -> Result<(), CliError> {
    for pos in &descriptor.positionals {
        write_field(pos.field, pos.bind(cmd), matches)?;
    }
    for flag in &descriptor.flags {
        write_field(flag.field, flag.bind(cmd), matches)?;
    }
    Ok(())
}

fn write_field(id: &str, field: FieldRef<'_>, matches: &ArgMatches) -> Result<(), CliError> {
    match field {
        FieldRef::Str(v) => {
            if let Some(s) = matches
                .try_get_one::<String>(id)
                .map_err(|e| binding_error(id, e))?
            {
                v.clone_from(s);
            }
        }
        FieldRef::OptStr(v) => {
            if let Some(s) = matches
                .try_get_one::<String>(id)
                .map_err(|e| binding_error(id, e))?
            {
                *v = Some(s.clone());
            }
        }
        FieldRef::Int(v) => {
            if let Some(n) = matches
                .try_get_one::<i64>(id)
                .map_err(|e| binding_error(id, e))?
            {
                *v = *n;
            }
        }
        FieldRef::Bool(v) => {
            if let Some(b) = matches
                .try_get_one::<bool>(id)
                .map_err(|e| binding_error(id, e))?
            {
                *v = *b;
            }
        }
        FieldRef::List(v) => {
            if let Some(values) = matches
                .try_get_many::<String>(id)
                .map_err(|e| binding_error(id, e))?
            {
                *v = values.cloned().collect();
            }
        }
        FieldRef::Map(v) => {
            if let Some(pairs) = matches
                .try_get_many::<(String, String)>(id)
                .map_err(|e| binding_error(id, e))?
            {
                *v = pairs
                    .filter(|(k, _)| !k.is_empty())
                    .cloned()
                    .collect::<BTreeMap<_, _>>();
            }
        }
    }
    Ok(())
}

// ============ Groups ============

struct Topic {
    name: String,
    about: String,
    body: String,
}

/// Inner node of the command tree.
pub struct Group {
    name: String,
    about: String,
    aliases: Vec<&'static str>,
    groups: Vec<Group>,
    leaves: Vec<Box<dyn Leaf>>,
    topics: Vec<Topic>,
}

impl Group {
    pub fn new(name: impl Into<String>, about: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            about: about.into(),
            aliases: Vec::new(),
            groups: Vec::new(),
            leaves: Vec::new(),
            topics: Vec::new(),
        }
    }

    pub fn alias(mut self, alias: &'static str) -> Self {
        self.aliases.push(alias);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attach `template` as a leaf. Its descriptor is built and checked
    /// against the template here.
    pub fn register<C: Command>(&mut self, template: C) -> Result<(), CliError> {
        let descriptor = C::describe()?;
        let mut scratch = template.clone();
        descriptor.check_fields(&mut scratch)?;

        let own = C::aliases();
        let aliases = aliases(&[own.as_slice()]);
        self.claim(&descriptor.name, &aliases)?;

        tracing::trace!(group = %self.name, command = %descriptor.name, "registered");
        self.leaves.push(Box::new(Registered {
            template,
            descriptor,
            aliases,
        }));
        Ok(())
    }

    pub fn add_group(&mut self, group: Group) -> Result<(), CliError> {
        self.claim(&group.name, &group.aliases)?;
        self.groups.push(group);
        Ok(())
    }

    /// Help-only subcommand printing `body`.
    pub fn add_topic(&mut self, name: &str, about: &str, body: &str) -> Result<(), CliError> {
        self.claim(name, &[])?;
        self.topics.push(Topic {
            name: name.into(),
            about: about.into(),
            body: body.into(),
        });
        Ok(())
    }

    fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.leaves
            .iter()
            .flat_map(|l| std::iter::once(l.name()).chain(l.aliases().iter().copied()))
            .chain(
                self.groups
                    .iter()
                    .flat_map(|g| std::iter::once(g.name.as_str()).chain(g.aliases.iter().copied())),
            )
            .chain(self.topics.iter().map(|t| t.name.as_str()))
    }

    fn claim(&self, name: &str, aliases: &[&str]) -> Result<(), CliError> {
        let taken: HashSet<&str> = self.names().collect();
        for candidate in std::iter::once(name).chain(aliases.iter().copied()) {
            if taken.contains(candidate) {
                return Err(CliError::Descriptor(format!(
                    "{:?} is already used in command group {:?}",
                    candidate, self.name
                )));
            }
        }
        Ok(())
    }

    /// The clap command for this subtree.
    pub fn clap_command(&self) -> clap::Command {
        let mut cmd = clap::Command::new(self.name.clone())
            .about(self.about.clone())
            .visible_aliases(self.aliases.clone())
            .subcommand_required(true)
            .arg_required_else_help(true);
        for group in &self.groups {
            cmd = cmd.subcommand(group.clap_command());
        }
        for leaf in &self.leaves {
            cmd = cmd.subcommand(leaf.clap_command());
        }
        for topic in &self.topics {
            cmd = cmd.subcommand(
                clap::Command::new(topic.name.clone())
                    .about(topic.about.clone())
                    .long_about(topic.body.clone()),
            );
        }
        cmd
    }

    /// Walk `matches` down to the selected leaf and run it.
    pub async fn dispatch(&self, ctx: &Context, matches: &ArgMatches) -> Result<(), CliError> {
        let mut group = self;
        let mut matches = matches;
        loop {
            let Some((name, sub)) = matches.subcommand() else {
                return Err(CliError::Usage(format!(
                    "missing subcommand for {:?}",
                    group.name
                )));
            };

            if let Some(leaf) = group.leaves.iter().find(|l| l.name() == name) {
                return leaf.invoke(ctx, sub).await;
            }
            if let Some(topic) = group.topics.iter().find(|t| t.name == name) {
                let mut out = ctx.stdout();
                writeln!(out, "{}", topic.body)?;
                return Ok(());
            }
            match group.groups.iter().find(|g| g.name == name) {
                Some(next) => {
                    group = next;
                    matches = sub;
                }
                None => return Err(CliError::Usage(format!("unknown command {name:?}"))),
            }
        }
    }
}
