mod cli;
mod lines;
mod model;
mod project;
mod reassign;
mod scan;

use clap::Parser;
use cli::{Cli, Command, ReassignArgs};
use model::{Message, ModLink};
use project::Project;

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Links { project } => {
            let project = Project::open(&project)?;
            for (ti, track) in project.tracks().iter().enumerate() {
                for (fi, fx) in track.fx.iter().enumerate() {
                    for (li, link) in fx.links.iter().enumerate() {
                        println!(
                            "{ti}/{fi}/{li}  {}  [{}] {}  \"{}\"  {}{}",
                            track.name.as_deref().unwrap_or("(unnamed)"),
                            fx.kind.tag(),
                            fx.name,
                            link.param_name,
                            wire_summary(link),
                            if link.bypassed { "  (bypassed)" } else { "" },
                        );
                    }
                }
            }
            Ok(())
        }
        Command::Reassign(args) => reassign_links(args),
    }
}

fn wire_summary(link: &ModLink) -> String {
    match &link.wire {
        None => "unassigned".to_string(),
        Some(w) => match w.message {
            Message::Controller(cc) => format!("CC {cc} ch {} bus {}", w.channel, w.bus),
            Message::Note(n) => format!("note {n} ch {} bus {}", w.channel, w.bus),
            Message::Other(kind) => format!("kind {kind} ch {} bus {}", w.channel, w.bus),
        },
    }
}

fn reassign_links(args: ReassignArgs) -> anyhow::Result<()> {
    let change = reassign::Reassignment {
        controller: args.cc,
        channel: args.channel,
        bus: args.bus,
    };
    if args.cc.is_none() && args.channel.is_none() && args.bus.is_none() {
        anyhow::bail!("nothing to change: pass at least one of --cc, --channel, --bus");
    }

    let mut project = Project::open(&args.project)?;
    let outcome = reassign::apply(&mut project, &args.links, &change)?;
    println!("{} applied, {} failed", outcome.applied, outcome.failed);

    if outcome.applied == 0 {
        log::warn!("no links were rewritten, leaving the file untouched");
        return Ok(());
    }
    let dest = args.out.as_deref().unwrap_or(&args.project);
    project.save(dest)?;
    Ok(())
}
