use crate::model::LinkRef;
use crate::project::Project;

/// A batch edit: each field is applied only where set, and every set field
/// must pass its closed range check before any link is touched.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reassignment {
    /// New controller number, 0-127.
    pub controller: Option<u32>,
    /// New MIDI channel, 0-16 (0 = all channels).
    pub channel: Option<u32>,
    /// New MIDI bus, 0-15.
    pub bus: Option<u32>,
}

impl Reassignment {
    fn validate(&self) -> anyhow::Result<()> {
        if let Some(cc) = self.controller {
            if cc > 127 {
                anyhow::bail!("controller {cc} out of range 0-127");
            }
        }
        if let Some(ch) = self.channel {
            if ch > 16 {
                anyhow::bail!("channel {ch} out of range 0-16");
            }
        }
        if let Some(bus) = self.bus {
            if bus > 15 {
                anyhow::bail!("bus {bus} out of range 0-15");
            }
        }
        Ok(())
    }
}

/// Per-link tally of a batch. Failed links are left exactly as they were.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub applied: usize,
    pub failed: usize,
}

/// Apply a reassignment to each of the given links independently.
///
/// Validation failures reject the whole batch before anything is touched.
/// Per-link failures (no MIDIPLINK line to rewrite, unresolvable address,
/// no existing value to keep for an unset field) are tallied and never
/// abort the rest: this is best-effort, not all-or-nothing.
pub fn apply(
    project: &mut Project,
    links: &[LinkRef],
    change: &Reassignment,
) -> anyhow::Result<BatchOutcome> {
    change.validate()?;
    let mut outcome = BatchOutcome::default();
    for &r in links {
        match apply_one(project, r, change) {
            Ok(()) => outcome.applied += 1,
            Err(e) => {
                log::warn!("skipping link {r}: {e}");
                outcome.failed += 1;
            }
        }
    }
    log::info!(
        "reassignment: {} applied, {} failed of {}",
        outcome.applied,
        outcome.failed,
        links.len()
    );
    Ok(outcome)
}

fn apply_one(project: &mut Project, r: LinkRef, change: &Reassignment) -> anyhow::Result<()> {
    let Some(link) = project.link(r) else {
        anyhow::bail!("no modulation link at {r}");
    };
    let wire = link.wire.as_ref();
    // unset fields keep the link's existing values
    let bus = match change.bus.or(wire.map(|w| w.bus)) {
        Some(v) => v,
        None => anyhow::bail!("no existing bus to keep"),
    };
    let channel = match change.channel.or(wire.map(|w| w.channel)) {
        Some(v) => v,
        None => anyhow::bail!("no existing channel to keep"),
    };
    let controller = match change.controller.or(wire.and_then(|w| w.message.value())) {
        Some(v) => v,
        None => anyhow::bail!("no existing controller value to keep"),
    };
    project.set_wire(r, bus, channel, controller)
}
