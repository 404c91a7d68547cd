// social_admin - operator commands that are not exposed over HTTP

use std::env;

use social_api::{
    app_state::AppState, config::Config, entities::UserRole,
    infrastructure::monitoring::initialize_tracing,
};

const USAGE: &str = "Usage: social_admin <command>
Commands:
  set-role <username> <member|admin>  - Change a user's role
  delete-user <username>              - Delete a user and everything they own";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    initialize_tracing();

    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{}", USAGE);
        return Ok(());
    };

    let config = Config::from_env()?;
    let state = AppState::new(config).await?;

    match (command.as_str(), &args[1..]) {
        ("set-role", [username, role]) => {
            let role: UserRole = role.parse().map_err(anyhow::Error::msg)?;
            let user = state.accounts.find_by_username(username).await?;
            let user = state.accounts.set_role(user.id, role).await?;
            println!("{} is now {}", user.username, user.role.as_str());
        }
        ("delete-user", [username]) => {
            let user = state.accounts.find_by_username(username).await?;
            state.accounts.delete_user(user.id).await?;
            println!("Deleted {}", user.username);
        }
        _ => {
            eprintln!("Unknown command or arguments: {}", args.join(" "));
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    }

    Ok(())
}
