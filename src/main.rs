use std::path::Path;
use std::sync::Arc;

use vocab::{
    audio::ExternalPlayer,
    cli::Cli,
    config::{Config, get_app_data_prefix},
    controller::Controller,
    importer::Importer,
    logging::{self, LogLevel},
    models::ImportOutcome,
    settings::Settings,
    speech::{self, SpeechSynthesizer},
    store::{Store, WordRepository},
    ui::app::App,
};

use clap::Parser;
use eyre::{Result, WrapErr};

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(LogLevel::from_verbosity(cli.verbose, cli.debug));

    let mut config = load_config(&cli);
    if let Some(db) = &cli.db {
        config.settings.database = Some(db.to_string_lossy().into_owned());
    }
    if cli.no_tts {
        config.settings.tts_enabled = false;
    }

    let db_path = config.database_path();
    logging::debug(format!("using database {}", db_path.display()));
    let store = Store::open(&db_path)
        .wrap_err_with(|| format!("Could not open database {}", db_path.display()))?;

    if cli.list {
        return list_files(&store);
    }
    if let Some(name) = &cli.dump {
        return dump_file(&store, name);
    }

    let synthesizer: Arc<dyn SpeechSynthesizer> = Arc::from(speech::from_settings(&config.settings)?);
    let importer = Importer::new(store.clone(), synthesizer.clone());

    let initial = import_files(&importer, &cli.files)?;
    if cli.import_only {
        return Ok(());
    }

    run_tui(config, store, importer, synthesizer, initial.as_deref())
}

fn load_config(cli: &Cli) -> Config {
    let loaded = match &cli.config {
        Some(path) => Config::load_from(path.clone()),
        None => Config::new(),
    };
    match loaded {
        Ok(config) => config,
        Err(err) => {
            logging::warn(format!("Could not load configuration: {}", err));
            logging::warn("Starting with default settings");
            let filepath = cli.config.clone().unwrap_or_else(|| {
                get_app_data_prefix()
                    .map(|prefix| prefix.join("configuration.json"))
                    .unwrap_or_else(|_| "configuration.json".into())
            });
            Config::with_settings(Settings::default(), filepath)
        }
    }
}

fn list_files(store: &Store) -> Result<()> {
    for file in store.list_files()? {
        println!("{}", file.filename);
    }
    Ok(())
}

fn dump_file(store: &Store, name: &str) -> Result<()> {
    let Some(file_id) = store.file_id(name)? else {
        eyre::bail!("No imported file named '{}'", name);
    };
    for row in store.rows_for_file(file_id)? {
        match &row.ipa {
            Some(ipa) => println!("{}\t{}\t{}", row.word, row.trans, ipa),
            None => println!("{}\t{}", row.word, row.trans),
        }
    }
    Ok(())
}

/// Import each file with progress on stdout. Returns the name of the last
/// file that is available afterwards.
fn import_files(importer: &Importer, files: &[impl AsRef<Path>]) -> Result<Option<String>> {
    let mut last = None;
    let mut failed = 0;
    for path in files {
        let path = path.as_ref();
        let result = importer.run(path, |progress| {
            println!(
                "{}: {} / {}",
                path.display(),
                progress.processed,
                progress.total
            );
        });
        match result {
            Ok(ImportOutcome::Imported(summary)) => {
                println!(
                    "Imported {}: {} entries, {} new words, {} reused",
                    summary.filename, summary.entries, summary.new_words, summary.reused_words
                );
                last = Some(summary.filename);
            }
            Ok(ImportOutcome::AlreadyImported(filename)) => {
                println!("{} already imported, skipping", filename);
                last = Some(filename);
            }
            Err(err) => {
                eprintln!("Failed to import {}: {}", path.display(), err);
                failed += 1;
            }
        }
    }
    if failed > 0 {
        eyre::bail!("{} file(s) failed to import", failed);
    }
    Ok(last)
}

fn run_tui(
    config: Config,
    store: Store,
    importer: Importer,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    initial: Option<&str>,
) -> Result<()> {
    let settings = &config.settings;
    let player = Arc::new(ExternalPlayer::new(settings.audio_player.clone()));
    let controller = Controller::new(
        Arc::new(store),
        synthesizer,
        player,
        settings.effective_page_size(),
    )
    .with_audio_format(settings.audio_format.clone());

    let mut app = App::new(controller, importer, settings.mouse_support);
    app.open_file(initial)?;

    let log_path = config.log_path();
    if let Err(err) = logging::redirect_to_file(&log_path) {
        logging::warn(format!("Could not open {}: {}", log_path.display(), err));
    }
    let result = app.run();
    logging::redirect_to_stderr();
    result
}
