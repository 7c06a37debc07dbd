use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use warehouse_ops::{
    config, db,
    entities::UserRole,
    services::users::{NewUser, UserService},
};

/// Seeds an operator account. Accounts are otherwise managed outside the API.
#[derive(Parser)]
#[command(name = "create-user", about = "Create a warehouse-ops user", version)]
struct Cli {
    #[arg(long, help = "Display name shown on occurrences")]
    name: String,

    #[arg(long, help = "Login used to sign in (stored lowercased)")]
    login: String,

    #[arg(long, env = "WAREHOUSE_USER_PASSWORD", help = "Password, at least 8 characters")]
    password: String,

    #[arg(long, default_value = "OPERADOR", help = "ADMIN, GERENTE or OPERADOR")]
    role: UserRole,

    #[arg(long, help = "Department used for occurrence routing")]
    department: String,

    #[arg(long, help = "Run pending migrations before inserting")]
    migrate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config::load_config().context("failed to load application config")?;
    config::init_tracing(config.log_level(), config.log_json);

    let pool = db::establish_connection_from_app_config(&config)
        .await
        .context("failed to connect to database")?;
    if cli.migrate {
        db::run_migrations(&pool)
            .await
            .context("failed to run migrations")?;
    }

    let users = UserService::new(Arc::new(pool));
    let user = users
        .create_user(NewUser {
            name: cli.name,
            login: cli.login,
            password: cli.password,
            role: cli.role,
            department: cli.department,
        })
        .await
        .context("failed to create user")?;

    println!(
        "created {} ({}) role={} department={}",
        user.login, user.id, user.role, user.department
    );
    Ok(())
}
