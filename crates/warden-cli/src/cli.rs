use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "warden",
    about = "Warden: blueprint compliance scoring, predictive drift monitoring, and self-remediation",
    version
)]
pub struct Cli {
    /// Repository root
    #[arg(long, global = true, default_value = ".")]
    pub root: String,

    /// Config file (default: .warden/config.toml under the root)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Log progress to stderr (WARDEN_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Evaluate every blueprint artifact and report health
    Scan {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Plan repairs for every artifact; apply the safe ones with --fix
    Heal {
        /// Apply safe repairs (default: plan only)
        #[arg(long)]
        fix: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Learn patterns from the historical event logs
    Patterns {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Predict compliance violations from live repository state
    Monitor {
        /// Execute prevention actions for this run regardless of config
        #[arg(long)]
        auto_prevent: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run every prevention mechanism against its synthetic scenarios
    ValidateMechanisms {
        /// Mechanism catalog JSON replacing the built-in one
        #[arg(long)]
        catalog: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
