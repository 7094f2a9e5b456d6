use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "cohort-server", about = "Cohort chat and call-signaling gateway")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/cohort.toml")]
    pub config: String,
}
