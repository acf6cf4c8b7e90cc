use astrumotaku::content::Sources;
use astrumotaku::db::Database;
use astrumotaku::features::FeatureRegistry;
use astrumotaku::lifecycle::{ReadyGate, Shutdown};
use astrumotaku::transport::SerenityTransport;
use astrumotaku::{commands, config::Config, interactions, scheduler, Data};
use poise::serenity_prelude as serenity;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = Config::from_env()?;
    let discord_token = config.discord_token.clone();
    info!("Loaded configuration: {:?}", config);

    let shutdown = Shutdown::new();

    let mut owners = HashSet::new();
    if let Some(owner_id) = config.owner_id {
        owners.insert(serenity::UserId::new(owner_id));
    }

    let setup_ready = ReadyGate::new();
    let setup_shutdown = shutdown.clone();
    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: commands::all(),
            owners,
            event_handler: |ctx, event, _framework, data| {
                Box::pin(async move {
                    match event {
                        serenity::FullEvent::Ready { data_about_bot } => {
                            info!("Connected as {}", data_about_bot.user.name);
                            data.ready.open();
                        }
                        serenity::FullEvent::InteractionCreate {
                            interaction: serenity::Interaction::Component(component),
                        } => {
                            if let Err(e) =
                                interactions::handle_component(ctx, component, data).await
                            {
                                error!("Component interaction failed: {}", e);
                            }
                        }
                        _ => {}
                    }
                    Ok(())
                })
            },
            on_error: |error| {
                Box::pin(async move {
                    if let Err(e) = poise::builtins::on_error(error).await {
                        error!("Error while handling error: {}", e);
                    }
                })
            },
            ..Default::default()
        })
        .setup(move |ctx, _ready, framework| {
            Box::pin(async move {
                info!("Bot is ready!");
                if config.register_commands {
                    match config.dev_guild_id {
                        Some(guild_id) => {
                            poise::builtins::register_in_guild(
                                ctx,
                                &framework.options().commands,
                                serenity::GuildId::new(guild_id),
                            )
                            .await?;
                            info!("Registered commands in guild {}", guild_id);
                        }
                        None => {
                            poise::builtins::register_globally(ctx, &framework.options().commands)
                                .await?;
                            info!("Registered commands globally");
                        }
                    }
                }

                // Set bot status
                ctx.set_activity(Some(serenity::ActivityData::custom(&config.status_message)));

                let db = Database::new(&config.database_url)?;
                db.execute_init()?;

                let features = FeatureRegistry::load(&config.feature_config_dir);
                let sources = Sources::new(&config, reqwest::Client::new(), &features, &db);

                let transport = Arc::new(SerenityTransport::new(
                    ctx.http.clone(),
                    ctx.cache.clone(),
                    setup_ready.clone(),
                ));
                let loops = scheduler::spawn_all(
                    &features,
                    &sources,
                    transport,
                    &setup_shutdown,
                    config.delivery_timeout(),
                );
                info!("Started {} broadcast loops", loops.len());
                setup_ready.open();

                Ok(Data {
                    config,
                    db,
                    features,
                    sources,
                    ready: setup_ready,
                    shutdown: setup_shutdown,
                })
            })
        })
        .build();

    let intents = serenity::GatewayIntents::non_privileged();

    let mut client = serenity::ClientBuilder::new(&discord_token, intents)
        .framework(framework)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create client: {}", e))?;

    let shard_manager = client.shard_manager.clone();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, shutting down");
            signal_shutdown.trigger();
            shard_manager.shutdown_all().await;
        }
    });

    info!("Starting bot...");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    shutdown.trigger();
    info!("Bot stopped");
    Ok(())
}
