mod cli;

use std::process::ExitCode;
use std::sync::Arc;

use cli::{Cli, Commands, ConfigArgs};
use crawlcore::config::{load_config, CrawlerConfig};
use crawlcore::crawler::Crawler;
use crawlcore::fs_collector::FsReferenceHandler;
use crawlcore::logging::init_logging;
use crawlcore::pipeline::JsonlCommitter;
use crawlcore::spoil::GenericSpoilPolicy;

fn main() -> ExitCode {
    let cli = Cli::parse_args();

    let result = match cli.command {
        Commands::Start { config } => with_config(&config, |cfg| {
            init_logging(cfg.logs_dir())?;
            let crawler = build_crawler(cfg)?;
            let summary = crawler.run()?;
            println!(
                "{} reference(s) processed in {}s{}",
                summary.processed,
                summary.duration_secs,
                if summary.stopped { " (stopped)" } else { "" }
            );
            Ok(())
        }),

        Commands::Stop { config } => with_config(&config, |cfg| {
            std::fs::create_dir_all(cfg.crawler_dir())?;
            std::fs::write(cfg.stop_file(), b"stop\n")?;
            println!("stop requested for crawler '{}'", cfg.id);
            Ok(())
        }),

        Commands::Clean { config } => with_config(&config, |cfg| {
            let crawler = build_crawler(cfg)?;
            crawler.clean()?;
            println!("crawler work directory removed");
            Ok(())
        }),

        Commands::Configcheck { config } => with_config(&config, |cfg| {
            println!("configuration ok: crawler '{}'", cfg.id);
            Ok(())
        }),

        Commands::Storeexport { config, output } => with_config(&config, |cfg| {
            let crawler = build_crawler(cfg)?;
            let path = crawler.export_store(&output)?;
            println!("store exported to {}", path.display());
            Ok(())
        }),

        Commands::Storeimport { config, input } => with_config(&config, |cfg| {
            let crawler = build_crawler(cfg)?;
            let count = crawler.import_store(&input)?;
            println!("imported {count} store record(s)");
            Ok(())
        }),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn with_config<F>(args: &ConfigArgs, run: F) -> Result<(), Box<dyn std::error::Error>>
where
    F: FnOnce(&CrawlerConfig) -> Result<(), Box<dyn std::error::Error>>,
{
    let config = load_config(&args.config, args.variables.as_deref())?;
    run(&config)
}

fn build_crawler(config: &CrawlerConfig) -> Result<Crawler, Box<dyn std::error::Error>> {
    let handler = FsReferenceHandler::new(&config.filesystem);
    let committer = JsonlCommitter::new(config.downloads_dir().join("committed.jsonl"));
    let crawler = Crawler::new(
        config.clone(),
        Box::new(handler),
        Arc::new(committer),
        Arc::new(GenericSpoilPolicy::new()),
    )?;
    Ok(crawler)
}
