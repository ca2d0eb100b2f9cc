//! Vellum CLI - headless CMS plugin administration

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use vellum_core::config::Config;
use vellum_core::plugins::{NewPlugin, Plugin, PluginService};
use vellum_core::storage::{Database, DatabaseConfig};

#[derive(Parser)]
#[command(name = "vellum")]
#[command(author, version, about = "Headless CMS admin backend", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Database path (overrides configuration)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Actor recorded in the activity log for lifecycle actions
    #[arg(long, global = true)]
    actor: Option<String>,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage installed plugins
    Plugins {
        #[command(subcommand)]
        action: PluginCmd,
    },

    /// Inspect plugin hooks
    Hooks {
        #[command(subcommand)]
        action: HookCmd,
    },

    /// Inspect plugin routes
    Routes {
        /// Plugin id or name
        plugin: String,
    },

    /// Show recent activity for a plugin
    Activity {
        /// Plugin id or name
        plugin: String,
        /// Number of entries to show
        #[arg(short, long, default_value_t = 20)]
        limit: u32,
    },

    /// Reconcile the built-in plugin manifest
    Bootstrap,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCmd,
    },

    /// Run health check
    Doctor,
}

#[derive(Subcommand)]
enum PluginCmd {
    /// List all plugins
    List,

    /// Show a plugin in detail
    Info {
        /// Plugin id or name
        plugin: String,
    },

    /// Install a plugin record
    Install {
        /// Unique plugin name
        name: String,
        /// Display name (defaults to the name)
        #[arg(long)]
        display_name: Option<String>,
        #[arg(long, default_value = "0.1.0")]
        version: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "")]
        author: String,
        #[arg(long, default_value = "")]
        category: String,
        /// Dependency plugin name (repeatable)
        #[arg(long = "depends")]
        dependencies: Vec<String>,
        /// Permission string (repeatable)
        #[arg(long = "permission")]
        permissions: Vec<String>,
        /// Initial settings as a JSON object
        #[arg(long)]
        settings: Option<String>,
    },

    /// Activate a plugin
    Activate {
        /// Plugin id or name
        plugin: String,
    },

    /// Deactivate a plugin
    Deactivate {
        /// Plugin id or name
        plugin: String,
    },

    /// Uninstall a plugin
    Uninstall {
        /// Plugin id or name
        plugin: String,
    },

    /// Overwrite a plugin's settings
    Settings {
        /// Plugin id or name
        plugin: String,
        /// New settings as a JSON object
        settings: String,
    },

    /// Show plugin counts by status
    Stats,
}

#[derive(Subcommand)]
enum HookCmd {
    /// Active hooks registered by a plugin, in dispatch order
    List {
        /// Plugin id or name
        plugin: String,
    },

    /// Active hooks for a named extension point across all plugins
    Dispatch {
        /// Hook name, e.g. content:save
        hook_name: String,
    },
}

#[derive(Subcommand)]
enum ConfigCmd {
    /// List all configuration values
    List,
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("vellum_core=info".parse()?)
                .add_directive("vellum_cli=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;
    let actor = cli.actor.clone();
    let actor = actor.as_deref();

    // Open the database only for commands that need it
    let open = || async {
        let db_path = cli
            .db
            .clone()
            .unwrap_or_else(|| config.database.path.clone());
        let db = Database::new(
            DatabaseConfig::with_path(db_path).max_connections(config.database.max_connections),
        )
        .await?;

        tracing::debug!(path = %db.path().display(), "Database opened");

        let service = PluginService::new(db.pool().clone(), config.load_manifest()?);
        if config.bootstrap.auto_bootstrap && service.is_bootstrap_needed().await? {
            tracing::info!("First run detected, bootstrapping core plugins");
            service.bootstrap_core_plugins().await;
        }
        anyhow::Ok((db, service))
    };

    match cli.command {
        Commands::Plugins { action } => {
            let (_db, service) = open().await?;
            cmd_plugins(&service, action, actor, cli.quiet).await
        }
        Commands::Hooks { action } => {
            let (_db, service) = open().await?;
            cmd_hooks(&service, action).await
        }
        Commands::Routes { plugin } => {
            let (_db, service) = open().await?;
            cmd_routes(&service, &plugin).await
        }
        Commands::Activity { plugin, limit } => {
            let (_db, service) = open().await?;
            cmd_activity(&service, &plugin, limit).await
        }
        Commands::Bootstrap => {
            let (_db, service) = open().await?;
            cmd_bootstrap(&service, cli.quiet).await
        }
        Commands::Doctor => {
            let (db, service) = open().await?;
            cmd_doctor(&db, &service).await
        }
        Commands::Config { action } => cmd_config(config.clone(), action, cli.quiet),
    }
}

/// Resolve a plugin argument as an id first, then as a name
async fn resolve_plugin(service: &PluginService, ident: &str) -> anyhow::Result<Plugin> {
    if let Some(plugin) = service.get_plugin(ident).await? {
        return Ok(plugin);
    }
    if let Some(plugin) = service.get_plugin_by_name(ident).await? {
        return Ok(plugin);
    }
    Err(anyhow::anyhow!(
        "Plugin '{}' not found. Run `vellum plugins list` to see installed plugins.",
        ident
    ))
}

async fn cmd_plugins(
    service: &PluginService,
    action: PluginCmd,
    actor: Option<&str>,
    quiet: bool,
) -> anyhow::Result<()> {
    match action {
        PluginCmd::List => {
            let plugins = service.list_plugins().await?;
            if plugins.is_empty() {
                if !quiet {
                    println!("No plugins installed.");
                }
                return Ok(());
            }
            for p in plugins {
                let marker = if p.is_core { " [core]" } else { "" };
                println!("  {} - {} v{} ({}){}", p.name, p.display_name, p.version, p.status, marker);
            }
        }

        PluginCmd::Info { plugin } => {
            let p = resolve_plugin(service, &plugin).await?;
            println!("Plugin: {}", p.display_name);
            println!("  ID: {}", p.id);
            println!("  Name: {}", p.name);
            println!("  Version: {}", p.version);
            println!("  Status: {}", p.status);
            println!("  Core: {}", p.is_core);
            if !p.description.is_empty() {
                println!("  Description: {}", p.description);
            }
            if !p.author.is_empty() {
                println!("  Author: {}", p.author);
            }
            if !p.category.is_empty() {
                println!("  Category: {}", p.category);
            }
            if !p.dependencies.is_empty() {
                println!("  Dependencies: {}", p.dependencies.join(", "));
            }
            if !p.permissions.is_empty() {
                println!("  Permissions: {}", p.permissions.join(", "));
            }
            if let Some(msg) = &p.error_message {
                println!("  Error: {}", msg);
            }
            println!("  Settings: {}", serde_json::to_string_pretty(&p.settings)?);
            println!("  Installed: {}", p.installed_at.format("%Y-%m-%d %H:%M:%S"));
            if let Some(activated_at) = p.activated_at {
                println!("  Activated: {}", activated_at.format("%Y-%m-%d %H:%M:%S"));
            }
        }

        PluginCmd::Install {
            name,
            display_name,
            version,
            description,
            author,
            category,
            dependencies,
            permissions,
            settings,
        } => {
            let settings = match settings {
                Some(raw) => serde_json::from_str(&raw)
                    .map_err(|e| anyhow::anyhow!("--settings is not valid JSON: {}", e))?,
                None => serde_json::json!({}),
            };
            let display_name = display_name.unwrap_or_else(|| name.clone());

            let plugin = service
                .install(
                    NewPlugin::new(&name, &display_name)
                        .with_version(version)
                        .with_description(description)
                        .with_author(author)
                        .with_category(category)
                        .with_dependencies(dependencies)
                        .with_permissions(permissions)
                        .with_settings(settings),
                )
                .await?;

            if !quiet {
                println!("Installed '{}' ({})", plugin.name, plugin.id);
            }
        }

        PluginCmd::Activate { plugin } => {
            let p = resolve_plugin(service, &plugin).await?;
            service.activate(&p.id, actor).await?;
            if !quiet {
                println!("Activated '{}'.", p.name);
            }
        }

        PluginCmd::Deactivate { plugin } => {
            let p = resolve_plugin(service, &plugin).await?;
            service.deactivate(&p.id, actor).await?;
            if !quiet {
                println!("Deactivated '{}'.", p.name);
            }
        }

        PluginCmd::Uninstall { plugin } => {
            let p = resolve_plugin(service, &plugin).await?;
            service.uninstall(&p.id, actor).await?;
            if !quiet {
                println!("Uninstalled '{}'.", p.name);
            }
        }

        PluginCmd::Settings { plugin, settings } => {
            let p = resolve_plugin(service, &plugin).await?;
            let settings = serde_json::from_str(&settings)
                .map_err(|e| anyhow::anyhow!("settings are not valid JSON: {}", e))?;
            service.update_settings(&p.id, settings, actor).await?;
            if !quiet {
                println!("Settings updated for '{}'.", p.name);
            }
        }

        PluginCmd::Stats => {
            let stats = service.stats().await?;
            println!("Plugins: {}", stats.total);
            println!("  Active: {}", stats.active);
            println!("  Inactive: {}", stats.inactive);
            println!("  Error: {}", stats.error);
        }
    }
    Ok(())
}

async fn cmd_hooks(service: &PluginService, action: HookCmd) -> anyhow::Result<()> {
    let hooks = match action {
        HookCmd::List { plugin } => {
            let p = resolve_plugin(service, &plugin).await?;
            service.plugin_hooks(&p.id).await?
        }
        HookCmd::Dispatch { hook_name } => service.hooks_by_name(&hook_name).await?,
    };

    if hooks.is_empty() {
        println!("No active hooks.");
        return Ok(());
    }
    for hook in hooks {
        println!(
            "  [{}] {} -> {} (plugin {})",
            hook.priority, hook.hook_name, hook.handler_name, hook.plugin_id
        );
    }
    Ok(())
}

async fn cmd_routes(service: &PluginService, plugin: &str) -> anyhow::Result<()> {
    let p = resolve_plugin(service, plugin).await?;
    let routes = service.plugin_routes(&p.id).await?;

    if routes.is_empty() {
        println!("No active routes.");
        return Ok(());
    }
    for route in routes {
        let middleware = if route.middleware.is_empty() {
            String::new()
        } else {
            format!(" [{}]", route.middleware.join(", "))
        };
        println!("  {} {} -> {}{}", route.method, route.path, route.handler_name, middleware);
    }
    Ok(())
}

async fn cmd_activity(service: &PluginService, plugin: &str, limit: u32) -> anyhow::Result<()> {
    // Activity may reference an uninstalled plugin, so fall back to the
    // raw identifier when no record resolves.
    let plugin_id = match service.get_plugin(plugin).await? {
        Some(p) => p.id,
        None => match service.get_plugin_by_name(plugin).await? {
            Some(p) => p.id,
            None => plugin.to_string(),
        },
    };

    let entries = service.recent_activity(&plugin_id, limit).await?;
    if entries.is_empty() {
        println!("No activity recorded.");
        return Ok(());
    }
    for entry in entries {
        let user = entry.user_id.as_deref().unwrap_or("-");
        println!(
            "  {} {} by {}",
            entry.created_at.format("%Y-%m-%d %H:%M:%S"),
            entry.action,
            user
        );
    }
    Ok(())
}

async fn cmd_bootstrap(service: &PluginService, quiet: bool) -> anyhow::Result<()> {
    let report = service.bootstrap_core_plugins().await;
    if !quiet {
        println!(
            "Reconciled: {} installed, {} updated, {} activated",
            report.installed, report.updated, report.activated
        );
        for (name, error) in &report.failed {
            println!("  failed: {} ({})", name, error);
        }
    }
    if report.failed.is_empty() {
        Ok(())
    } else {
        Err(anyhow::anyhow!("{} manifest entries failed", report.failed.len()))
    }
}

fn cmd_config(mut config: Config, action: ConfigCmd, quiet: bool) -> anyhow::Result<()> {
    match action {
        ConfigCmd::List => {
            for (key, value) in config.entries() {
                println!("  {} = {}", key, value);
            }
        }
        ConfigCmd::Get { key } => {
            println!("{}", config.get(&key)?);
        }
        ConfigCmd::Set { key, value } => {
            config.set(&key, &value)?;
            config.save()?;
            if !quiet {
                println!("Set {} = {}", key, value);
            }
        }
    }
    Ok(())
}

async fn cmd_doctor(db: &Database, service: &PluginService) -> anyhow::Result<()> {
    db.health_check().await?;
    println!("Database: ok ({})", db.path().display());

    let status = db.migration_status().await?;
    println!(
        "Schema: v{} (target v{}){}",
        status.current_version,
        status.target_version,
        if status.needs_migration { " - migration needed" } else { "" }
    );

    let stats = service.stats().await?;
    println!(
        "Plugins: {} total, {} active, {} inactive, {} error",
        stats.total, stats.active, stats.inactive, stats.error
    );

    if service.is_bootstrap_needed().await? {
        println!("Bootstrap: needed (core plugins missing)");
    } else {
        println!("Bootstrap: ok");
    }
    Ok(())
}
