//! CLI argument definitions for `voicefx`.

use clap::{Arg, ArgAction, Command};

fn input_arg() -> Arg {
    Arg::new("INPUT")
        .help("Recording to process (any format symphonia can decode), or - to use standard input")
        .required(true)
        .index(1)
}

fn effect_arg() -> Arg {
    Arg::new("effect")
        .long("effect")
        .short('e')
        .value_name("EFFECT")
        .required(true)
        .help("Effect to apply: alien, cartoon or ghost")
}

fn gain_arg() -> Arg {
    Arg::new("GAIN")
        .long("gain")
        .short('g')
        .value_name("GAIN")
        .value_parser(clap::value_parser!(u8).range(0..=100))
        .help("Master volume, 0 to 100 (default 70)")
}

fn settings_arg() -> Arg {
    Arg::new("settings")
        .long("settings")
        .value_name("PATH")
        .help("JSON file with session settings")
}

fn seed_arg() -> Arg {
    Arg::new("seed")
        .long("seed")
        .value_name("SEED")
        .value_parser(clap::value_parser!(u64))
        .help("Seed for the ghost reverb noise")
}

/// Build the CLI argument parser and command definitions.
pub fn build_cli() -> Command {
    Command::new("voicefx")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Apply alien, cartoon and ghost effects to voice recordings")
        .arg_required_else_help(true)
        .subcommand_required(true)
        .arg(
            Arg::new("quiet")
                .long("quiet")
                .short('q')
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Only log errors"),
        )
        .subcommand(
            Command::new("effects")
                .about("List the available effects")
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print the list as JSON"),
                ),
        )
        .subcommand(
            Command::new("create")
                .about("Emit default JSON payloads")
                .subcommand_required(true)
                .subcommand(
                    Command::new("settings-json")
                        .about("Print the default session settings as JSON"),
                ),
        )
        .subcommand(
            Command::new("render")
                .about("Render an effect offline into voice-<effect>-effect.wav")
                .arg(input_arg())
                .arg(effect_arg())
                .arg(
                    Arg::new("output-dir")
                        .long("output-dir")
                        .short('o')
                        .value_name("DIR")
                        .default_value(".")
                        .help("Directory to write the WAV file into"),
                )
                .arg(gain_arg())
                .arg(seed_arg())
                .arg(settings_arg()),
        )
        .subcommand(
            Command::new("preview")
                .about("Play an effect through the default output device")
                .arg(input_arg())
                .arg(effect_arg())
                .arg(gain_arg())
                .arg(seed_arg())
                .arg(settings_arg()),
        )
}
