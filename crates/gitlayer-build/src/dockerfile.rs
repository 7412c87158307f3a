use gitlayer_core::{BuildStep, Registration};

/// Renders artifact registrations as a Dockerfile, one section per build step.
///
/// Snapshot tarballs are `ADD`ed so the engine unpacks them at the target;
/// patches are `COPY`ed to their staging path and applied by the registered
/// `RUN` command. Steps run in [`BuildStep`] order, so a change to the
/// latest patch only rebuilds the `setup` section.
pub struct DockerfileGenerator<'a> {
    base_image: &'a str,
    registrations: &'a [Registration],
}

impl<'a> DockerfileGenerator<'a> {
    pub fn new(base_image: &'a str, registrations: &'a [Registration]) -> Self {
        Self {
            base_image,
            registrations,
        }
    }

    pub fn render(&self) -> String {
        let mut out = format!("# generated by gitlayer\nFROM {}\n", self.base_image);

        for step in BuildStep::ALL {
            let mut section = self
                .registrations
                .iter()
                .filter(|r| r.step() == step)
                .peekable();
            if section.peek().is_none() {
                continue;
            }

            out.push_str(&format!("\n# === Step: {step} ===\n"));
            for registration in section {
                out.push_str(&instruction(registration));
                out.push('\n');
            }
        }
        out
    }
}

fn instruction(registration: &Registration) -> String {
    match registration {
        Registration::CopyIn {
            destination,
            target,
            ..
        } if destination.ends_with(".tar.gz") => format!("ADD {destination} {target}"),
        Registration::CopyIn {
            destination,
            target,
            ..
        } => format!("COPY {destination} {}/{destination}", target.trim_end_matches('/')),
        Registration::Run { apply, cleanup, .. } if cleanup.is_empty() => format!("RUN {apply}"),
        Registration::Run { apply, cleanup, .. } => format!("RUN {apply} && {cleanup}"),
    }
}
