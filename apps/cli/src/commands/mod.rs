mod auth;
mod files;

use crate::cli::{Command, FilesCommand};
use crate::context::Context;

pub async fn run(command: Command, ctx: Context) -> anyhow::Result<()> {
    match command {
        Command::Login(args) => auth::login(&ctx, args).await,
        Command::Logout => auth::logout(&ctx),
        Command::Files(FilesCommand::Upload(args)) => files::upload(&ctx, args).await,
        Command::Files(FilesCommand::Filestream(args)) => files::filestream(&ctx, args).await,
        Command::Files(FilesCommand::Mkdir(args)) => files::mkdir(&ctx, args).await,
        Command::Files(FilesCommand::Update(args)) => files::update(&ctx, args).await,
    }
}
