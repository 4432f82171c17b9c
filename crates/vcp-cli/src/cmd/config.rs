use anyhow::Result;
use serde::Serialize;
use vcp_core::config::{ConfigSource, IntegrityConfig};

use super::Context;
use crate::output::{pretty_kv, pretty_rule, render_mode};

#[derive(Debug, Serialize)]
struct ConfigOutput<'a> {
    source: String,
    interval_secs: u64,
    config: &'a IntegrityConfig,
}

fn describe(source: &ConfigSource) -> String {
    match source {
        ConfigSource::File(path) => path.display().to_string(),
        ConfigSource::Defaults => "defaults".to_string(),
    }
}

pub fn run_config(ctx: &Context) -> Result<()> {
    let rendered = toml::to_string_pretty(&ctx.config)?;
    let out = ConfigOutput {
        source: describe(&ctx.source),
        interval_secs: ctx.config.interval_secs(),
        config: &ctx.config,
    };
    render_mode(
        ctx.output,
        &out,
        |_, w| write!(w, "{rendered}"),
        |o, w| {
            pretty_kv(w, "source", &o.source)?;
            pretty_kv(w, "interval", format!("{}s", o.interval_secs))?;
            pretty_kv(w, "targets", o.config.anchor.targets.len().to_string())?;
            pretty_rule(w)?;
            write!(w, "{rendered}")
        },
    )
}
