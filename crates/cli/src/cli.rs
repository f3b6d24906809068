use clap::{Args, Parser, Subcommand, ValueEnum};

use nightshift_core::PowerAction;

/// Start or stop tagged compute instances.
///
/// Instances owned by an autoscaling group are never touched. Alarms watching
/// the targeted instances are suspended before a stop and resumed after a
/// start.
#[derive(Parser, Debug)]
#[command(name = "nightshift", version, about = "Start or stop tagged compute instances")]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Path to config file (default: ~/.config/nightshift/config.toml)
    #[arg(long, global = true, env = "NIGHTSHIFT_CONFIG")]
    pub config: Option<String>,

    /// Region override (beats the target, config file and AWS_REGION)
    #[arg(long, global = true)]
    pub region: Option<String>,

    /// Print the result as JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the tagged instances, then resume their alarms
    Start(TargetArgs),
    /// Suspend alarms on the tagged instances, then stop them
    Stop(TargetArgs),
    /// Show what start or stop would touch without changing anything
    Plan {
        #[arg(value_enum)]
        action: ActionArg,
        #[command(flatten)]
        target: TargetArgs,
    },
}

impl Command {
    pub fn target(&self) -> &TargetArgs {
        match self {
            Command::Start(t) | Command::Stop(t) => t,
            Command::Plan { target, .. } => target,
        }
    }
}

/// Which instances to act on: an explicit tag, or a named target from the
/// config file. Falls back to NIGHTSHIFT_TAG_KEY / NIGHTSHIFT_TAG_VALUE.
#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// Tag key to match
    #[arg(long, conflicts_with = "target")]
    pub tag_key: Option<String>,

    /// Tag value to match
    #[arg(long, conflicts_with = "target")]
    pub tag_value: Option<String>,

    /// Named target from the config file
    #[arg(long)]
    pub target: Option<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionArg {
    Start,
    Stop,
}

impl From<ActionArg> for PowerAction {
    fn from(action: ActionArg) -> Self {
        match action {
            ActionArg::Start => PowerAction::Start,
            ActionArg::Stop => PowerAction::Stop,
        }
    }
}
