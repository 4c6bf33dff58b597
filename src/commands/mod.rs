//! Command implementations, one module per verb family

pub mod instance;
pub mod zone;

use crate::error::CliError;
use crate::registrar::Group;

/// Attach every command group under `root`.
pub fn register_all(root: &mut Group) -> Result<(), CliError> {
    let mut zones = Group::new("zone", "Zones management");
    zones.register(zone::ZoneListCmd)?;
    root.add_group(zones)?;

    let mut compute = Group::new("compute", "Compute services management").alias("c");
    compute.add_group(instance::group()?)?;
    root.add_group(compute)?;

    Ok(())
}
