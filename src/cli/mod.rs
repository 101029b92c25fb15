pub mod commands;

use clap::{Arg, ArgAction, Command};

use crate::config::DEFAULT_CONFIG_FILE;

pub use commands::handle_subcommands;

pub fn build_cli() -> Command {
    Command::new("motion-connector")
        .version(crate::VERSION)
        .about("Modbus TCP connector for motion controllers")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file (.json or .toml)")
                .default_value(DEFAULT_CONFIG_FILE)
                .global(true),
        )
        .arg(
            Arg::new("address")
                .short('a')
                .long("address")
                .value_name("HOST")
                .help("Override the controller address")
                .global(true),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Override the Modbus TCP port")
                .global(true),
        )
        .arg(
            Arg::new("interval")
                .short('i')
                .long("interval")
                .value_name("MS")
                .help("Override the poll interval in milliseconds")
                .global(true),
        )
        .arg(
            Arg::new("format")
                .short('f')
                .long("format")
                .value_parser(["console", "json", "csv"])
                .default_value("console")
                .global(true),
        )
        .arg(
            Arg::new("output-file")
                .short('o')
                .long("output-file")
                .value_name("FILE")
                .help("Also write output to this file")
                .global(true),
        )
        .arg(
            Arg::new("overwrite")
                .long("overwrite")
                .action(ArgAction::SetTrue)
                .help("Replace the output file on every write instead of appending to it")
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Enable debug logging")
                .global(true),
        )
        .subcommand(Command::new("monitor").about("Poll continuously and print every interval"))
        .subcommand(Command::new("status").about("Poll once and print the snapshot"))
        .subcommand(Command::new("routines").about("List configured routines"))
        .subcommand(Command::new("groups").about("List register groups"))
        .subcommand(
            Command::new("registers")
                .about("Poll once and print register values")
                .arg(Arg::new("group").short('g').long("group").help("Only this group")),
        )
        .subcommand(
            Command::new("run")
                .about("Invoke a routine by name")
                .arg(Arg::new("routine").required(true))
                .arg(
                    Arg::new("parameters")
                        .num_args(0..=4)
                        .allow_negative_numbers(true)
                        .help("Up to four float parameters; missing ones use the configured defaults"),
                )
                .arg(
                    Arg::new("wait")
                        .short('w')
                        .long("wait")
                        .action(ArgAction::SetTrue)
                        .help("Wait for the routine to finish"),
                )
                .arg(
                    Arg::new("force")
                        .long("force")
                        .action(ArgAction::SetTrue)
                        .help("Invoke even if a routine is still outstanding"),
                ),
        )
        .subcommand(Command::new("cancel").about("Abort the running routine"))
        .subcommand(
            Command::new("error")
                .about("Translate a result code")
                .arg(Arg::new("code").required(true).allow_negative_numbers(true)),
        )
        .subcommand(
            Command::new("raw")
                .about("Dump a raw input register range")
                .arg(Arg::new("start").required(true))
                .arg(Arg::new("count").required(true)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        build_cli().debug_assert();
    }

    #[test]
    fn test_global_overrides_parse_after_subcommand() {
        let matches = build_cli()
            .try_get_matches_from([
                "motion-connector",
                "run",
                "Move",
                "1.5",
                "-2.5",
                "--wait",
                "--address",
                "10.0.0.5",
            ])
            .unwrap();

        assert_eq!(matches.get_one::<String>("address").unwrap(), "10.0.0.5");
        assert_eq!(matches.get_one::<String>("config").unwrap(), DEFAULT_CONFIG_FILE);

        let run = matches.subcommand_matches("run").unwrap();
        let parameters: Vec<&String> = run.get_many::<String>("parameters").unwrap().collect();
        assert_eq!(parameters, ["1.5", "-2.5"]);
        assert!(run.get_flag("wait"));
    }

    #[test]
    fn test_overwrite_is_off_by_default() {
        let matches = build_cli()
            .try_get_matches_from(["motion-connector", "status", "-o", "out.log"])
            .unwrap();
        assert!(!matches.get_flag("overwrite"));

        let matches = build_cli()
            .try_get_matches_from(["motion-connector", "status", "-o", "out.log", "--overwrite"])
            .unwrap();
        assert!(matches.get_flag("overwrite"));
    }

    #[test]
    fn test_too_many_parameters_are_rejected() {
        let result = build_cli().try_get_matches_from([
            "motion-connector", "run", "Move", "1", "2", "3", "4", "5",
        ]);
        assert!(result.is_err());
    }
}
