use clap::Parser;
use std::path::PathBuf;

use tayt_core::fuzz::{FuzzConfig, OracleMode};
use tayt_types::Felt;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Args {
    /// Compiled artifact (`.json`) or Cairo source file to fuzz.
    #[arg(value_name = "TARGET")]
    pub target: PathBuf,

    /// Number of calls in each generated sequence.
    #[arg(
        long,
        value_name = "N",
        default_value_t = 10,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub seq_len: u64,

    /// Never call these functions. Can be provided multiple times.
    #[arg(long, value_name = "NAME", num_args = 1..)]
    pub blacklist_function: Vec<String>,

    /// Sender address used when querying properties.
    #[arg(long, value_name = "FELT", default_value = "1")]
    pub psender: Felt,

    /// Sender addresses for state-mutating calls. Can be provided multiple times.
    ///
    /// Defaults to 0, 1 and 2 when omitted.
    #[arg(long, value_name = "FELT", num_args = 1..)]
    pub sender: Vec<Felt>,

    /// Extra import paths handed to the compiler. Can be provided multiple times.
    #[arg(long, value_name = "DIR", num_args = 1..)]
    pub cairo_path: Vec<PathBuf>,

    /// Write a line coverage report (`covered.<timestamp>.txt`) on exit.
    #[arg(long, default_value_t = false)]
    pub coverage: bool,

    /// Report violating sequences as found, without minimizing them.
    #[arg(long, default_value_t = false)]
    pub no_shrink: bool,

    /// Hunt for assertion failures instead of checking properties.
    #[arg(long, default_value_t = false)]
    pub exception_mode: bool,

    /// Declare these programs before deploying the target. Can be provided multiple times.
    #[arg(long, value_name = "PATH", num_args = 1..)]
    pub declare: Vec<PathBuf>,

    /// Print the class hash of the target and exit.
    #[arg(long, default_value_t = false)]
    pub get_class_hash: bool,

    /// Random seed; the same seed replays the same campaign.
    #[arg(long, value_name = "SEED", default_value_t = 0)]
    pub seed: u64,

    /// Stop after this many sequences even if obligations remain.
    #[arg(long, value_name = "N")]
    pub max_iterations: Option<u64>,

    /// Name prefix identifying property functions.
    #[arg(long, value_name = "PREFIX", default_value = "tayt_")]
    pub property_prefix: String,

    /// Endpoint of the JSON-RPC execution service.
    #[arg(
        long,
        value_name = "URL",
        env = "TAYT_RPC_URL",
        default_value = "http://127.0.0.1:5050/rpc"
    )]
    pub rpc_url: String,

    /// Compiler used for non-JSON targets.
    #[arg(long, value_name = "CMD", default_value = "starknet-compile")]
    pub compiler: String,

    /// Print the final report as JSON on stdout.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Enable debug logging.
    #[arg(long, short, default_value_t = false)]
    pub verbose: bool,
}

impl Args {
    /// Fuzzing knobs derived from the command line.
    pub fn to_config(&self) -> FuzzConfig {
        let defaults = FuzzConfig::default();
        FuzzConfig {
            seq_len: self.seq_len as usize,
            senders: if self.sender.is_empty() {
                defaults.senders
            } else {
                self.sender.clone()
            },
            psender: self.psender.clone(),
            blacklist: self.blacklist_function.iter().cloned().collect(),
            shrink: !self.no_shrink,
            mode: if self.exception_mode {
                OracleMode::Exception
            } else {
                OracleMode::Property
            },
            seed: self.seed,
            max_iterations: self.max_iterations,
            property_prefix: self.property_prefix.clone(),
            ..defaults
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_fuzz_config() {
        let args = Args::parse_from(["tayt", "counter.json"]);
        let config = args.to_config();
        let defaults = FuzzConfig::default();
        assert_eq!(config.seq_len, defaults.seq_len);
        assert_eq!(config.senders, defaults.senders);
        assert_eq!(config.psender, defaults.psender);
        assert!(config.shrink);
        assert_eq!(config.mode, OracleMode::Property);
        assert_eq!(config.property_prefix, "tayt_");
    }

    #[test]
    fn test_flags_map_onto_config() {
        let args = Args::parse_from([
            "tayt",
            "vault.cairo",
            "--seq-len",
            "4",
            "--sender",
            "0x10",
            "--sender",
            "7",
            "--psender",
            "0x2a",
            "--blacklist-function",
            "withdraw",
            "--no-shrink",
            "--exception-mode",
            "--seed",
            "99",
            "--max-iterations",
            "500",
        ]);
        let config = args.to_config();
        assert_eq!(config.seq_len, 4);
        assert_eq!(config.senders, vec![Felt::from(16u64), Felt::from(7u64)]);
        assert_eq!(config.psender, Felt::from(42u64));
        assert!(config.blacklist.contains("withdraw"));
        assert!(!config.shrink);
        assert_eq!(config.mode, OracleMode::Exception);
        assert_eq!(config.seed, 99);
        assert_eq!(config.max_iterations, Some(500));
    }

    #[test]
    fn test_list_flags_take_space_separated_values() {
        let args = Args::parse_from([
            "tayt",
            "token.json",
            "--sender",
            "0",
            "1",
            "2",
            "--blacklist-function",
            "mint",
            "burn",
            "--declare",
            "a.json",
            "b.json",
            "--cairo-path",
            "lib",
            "vendor",
        ]);
        assert_eq!(args.target, PathBuf::from("token.json"));
        let config = args.to_config();
        assert_eq!(
            config.senders,
            vec![Felt::from(0u64), Felt::from(1u64), Felt::from(2u64)]
        );
        assert!(config.blacklist.contains("mint") && config.blacklist.contains("burn"));
        assert_eq!(args.declare, vec![PathBuf::from("a.json"), PathBuf::from("b.json")]);
        assert_eq!(args.cairo_path, vec![PathBuf::from("lib"), PathBuf::from("vendor")]);
    }

    #[test]
    fn test_rejects_empty_sequences() {
        assert!(Args::try_parse_from(["tayt", "t.json", "--seq-len", "0"]).is_err());
        let args = Args::parse_from(["tayt", "t.json", "--seq-len", "1"]);
        assert_eq!(args.to_config().seq_len, 1);
    }

    #[test]
    fn test_rejects_bad_felt() {
        assert!(Args::try_parse_from(["tayt", "t.json", "--sender", "zz"]).is_err());
    }
}
