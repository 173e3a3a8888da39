use std::error::Error;
use std::io::Read;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

use clap::ArgMatches;
use log::info;
use serde_json::json;
use voicefx_lib::capture::{decode_audio_bytes, FileCapture, MemoryCapture};
use voicefx_lib::render::LiveEvent;
use voicefx_lib::{EffectSession, EffectSpec, SessionSettings};

const PREVIEW_POLL_MS: u64 = 20;

pub fn run(args: &ArgMatches) -> Result<i32, Box<dyn Error>> {
    match args.subcommand() {
        Some(("effects", sub)) => list_effects(sub.get_flag("json")),
        Some(("create", sub)) => create(sub),
        Some(("render", sub)) => render(sub),
        Some(("preview", sub)) => preview(sub),
        _ => Ok(-1),
    }
}

fn list_effects(as_json: bool) -> Result<i32, Box<dyn Error>> {
    if as_json {
        let effects: Vec<_> = EffectSpec::ALL
            .iter()
            .map(|effect| {
                json!({
                    "name": effect.as_str(),
                    "description": effect.description(),
                    "file_name": effect.file_name(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&effects)?);
    } else {
        for effect in EffectSpec::ALL {
            println!("{:<8} {}", effect.as_str(), effect.description());
        }
    }
    Ok(0)
}

fn create(args: &ArgMatches) -> Result<i32, Box<dyn Error>> {
    match args.subcommand() {
        Some(("settings-json", _)) => {
            println!("{}", SessionSettings::default().to_json_string()?);
            Ok(0)
        }
        _ => Ok(-1),
    }
}

fn render(args: &ArgMatches) -> Result<i32, Box<dyn Error>> {
    let effect = effect_from(args)?;
    let mut session = session_from(args)?;
    load_input(&mut session, args)?;

    let file = session.download(effect)?;
    let out_dir = args
        .get_one::<String>("output-dir")
        .map(String::as_str)
        .unwrap_or(".");
    let path = file.write_to_dir(out_dir)?;
    info!("{}", session.status());
    println!("{}", path.display());
    Ok(0)
}

fn preview(args: &ArgMatches) -> Result<i32, Box<dyn Error>> {
    let effect = effect_from(args)?;
    let mut session = session_from(args)?;
    load_input(&mut session, args)?;

    let id = session.preview(effect)?;
    loop {
        for event in session.poll_events() {
            match event {
                LiveEvent::Ended { id: ended } if ended == id => {
                    info!("{}", session.status());
                    return Ok(0);
                }
                LiveEvent::Failed { id: failed, message } if failed == id => {
                    return Err(message.into());
                }
                _ => {}
            }
        }
        sleep(Duration::from_millis(PREVIEW_POLL_MS));
    }
}

fn effect_from(args: &ArgMatches) -> Result<EffectSpec, Box<dyn Error>> {
    let name = args
        .get_one::<String>("effect")
        .ok_or("missing --effect")?;
    Ok(name.parse::<EffectSpec>()?)
}

fn session_from(args: &ArgMatches) -> Result<EffectSession, Box<dyn Error>> {
    let mut settings = match args.get_one::<String>("settings") {
        Some(path) => SessionSettings::from_json_file(path)?,
        None => SessionSettings::default(),
    };
    if let Some(seed) = args.get_one::<u64>("seed") {
        settings.reverb_seed = Some(*seed);
    }

    let mut session = EffectSession::new(settings);
    if let Some(gain) = args.get_one::<u8>("GAIN") {
        session.set_volume_percent(*gain);
    }
    info!("master volume {}%", session.settings().volume_percent());
    Ok(session)
}

fn load_input(session: &mut EffectSession, args: &ArgMatches) -> Result<(), Box<dyn Error>> {
    let input = args.get_one::<String>("INPUT").ok_or("missing input")?;
    if input == "-" {
        let mut bytes = Vec::new();
        std::io::stdin().read_to_end(&mut bytes)?;
        let mut capture = MemoryCapture::new(decode_audio_bytes(&bytes, None)?);
        session.record(&mut capture)?;
    } else {
        let mut capture = FileCapture::new(Path::new(input));
        session.record(&mut capture)?;
    }
    Ok(())
}
