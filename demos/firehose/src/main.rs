use anyhow::Result;
use bsky_firehose::config::FileStore;
use bsky_firehose::{
    Callbacks, CancellationToken, Comment, Config, Firehose, Follow, HandleEvent, InfoEvent, Like,
    MigrateEvent, Post, Registration, Repost, TombstoneEvent,
};
use chrono::{DateTime, Local};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Event {
    Post,
    Comment,
    Follow,
    Like,
    Repost,
    Handle,
    Info,
    Migrate,
    Tombstone,
}

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Configuration file (`.json` or `.toml`)
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Firehose endpoint, overriding the configuration
    #[arg(short, long)]
    url: Option<String>,
    /// Bearer token, overriding the configuration
    #[arg(short, long)]
    token: Option<String>,
    #[arg(long)]
    reconnect_delay_ms: Option<u64>,
    /// Events to print
    #[arg(short, long, value_delimiter = ',', default_value = "post")]
    events: Vec<Event>,
    /// Only print posts tagged with this language
    #[arg(short, long)]
    lang: Option<String>,
}

fn local_time(time: &str) -> String {
    DateTime::parse_from_rfc3339(time)
        .map(|t| t.with_timezone(&Local).to_string())
        .unwrap_or_else(|_| time.to_owned())
}

fn callbacks(events: &[Event], lang: Option<String>) -> Callbacks {
    let mut callbacks = Callbacks::new();
    for event in events {
        callbacks = match event {
            Event::Post => {
                let mut posts = Registration::new(|post: &Post| {
                    println!("{} - {}", local_time(&post.created_at), post.repo);
                    for line in post.text.split('\n') {
                        println!("  {line}");
                    }
                    Ok(())
                });
                if let Some(lang) = lang.clone() {
                    posts = posts.filter(move |post: &Post| post.langs.contains(&lang));
                }
                callbacks.on_post(posts)
            }
            Event::Comment => callbacks.on_comment(Registration::new(|comment: &Comment| {
                println!("{} replied to {}", comment.interaction.actor, comment.reply_to);
                println!("  {}", comment.text);
                Ok(())
            })),
            Event::Follow => callbacks.on_follow(Registration::new(|follow: &Follow| {
                println!("{} follow {}", follow.interaction.actor, follow.interaction.subject);
                Ok(())
            })),
            Event::Like => callbacks.on_like(Registration::new(|like: &Like| {
                println!("{} like {}", like.interaction.actor, like.uri);
                Ok(())
            })),
            Event::Repost => callbacks.on_repost(Registration::new(|repost: &Repost| {
                println!("{} repost {}", repost.interaction.actor, repost.uri);
                Ok(())
            })),
            Event::Handle => callbacks.on_handle(Registration::new(|event: &HandleEvent| {
                println!("{} is now {}", event.did, event.handle);
                Ok(())
            })),
            Event::Info => callbacks.on_info(Registration::new(|event: &InfoEvent| {
                println!("info {}: {}", event.name, event.message.as_deref().unwrap_or_default());
                Ok(())
            })),
            Event::Migrate => callbacks.on_migrate(Registration::new(|event: &MigrateEvent| {
                let to = event.migrate_to.as_deref().unwrap_or("?");
                println!("{} migrated to {to}", event.did);
                Ok(())
            })),
            Event::Tombstone => callbacks.on_tombstone(Registration::new(|event: &TombstoneEvent| {
                println!("{} tombstoned", event.did);
                Ok(())
            })),
        };
    }
    callbacks
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => Config::load(&FileStore::new(path)).await?,
        None => Config::default(),
    };
    if let Some(url) = args.url {
        config.firehose_url = url;
    }
    if let Some(token) = args.token {
        config.access_token = Some(token);
    }
    if let Some(delay) = args.reconnect_delay_ms {
        config.reconnect_delay_ms = delay;
    }

    let firehose = Arc::new(Firehose::from_config(config));
    let callbacks = callbacks(&args.events, args.lang);
    let subscription = tokio::spawn({
        let firehose = Arc::clone(&firehose);
        async move { firehose.subscribe(CancellationToken::new(), callbacks).await }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("interrupted, closing firehose");
    firehose.close();
    subscription.await?;
    Ok(())
}
