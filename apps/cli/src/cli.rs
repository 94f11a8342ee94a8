use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

/// Command-line client for PrismDrive.
#[derive(Parser, Debug)]
#[command(name = "prismdrive", author, version, about)]
pub struct Cli {
    /// API root, overriding the config file.
    #[arg(long, global = true, env = "PRISMDRIVE_API_BASE_URL")]
    pub api_base_url: Option<String>,

    /// Settings file to use instead of the default location.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Increase log output (-v info, -vv debug).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Log in and store the access token.
    Login(LoginArgs),

    /// Forget the stored access token.
    Logout,

    /// Work with remote files and folders.
    #[command(subcommand)]
    Files(FilesCommand),
}

#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Account email; prompted for when missing.
    #[arg(long, env = "PRISMDRIVE_EMAIL")]
    pub email: Option<String>,

    /// Account password; prompted for without echo when missing.
    #[arg(long, env = "PRISMDRIVE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Device name recorded with the token.
    #[arg(long, env = "PRISMDRIVE_DEVICE_NAME")]
    pub device_name: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum FilesCommand {
    /// Upload a file in a single buffered request.
    Upload(UploadArgs),

    /// Upload a file by streaming it, with progress and retries.
    Filestream(FilestreamArgs),

    /// Create a folder.
    Mkdir(MkdirArgs),

    /// Rename an entry or change its description.
    Update(UpdateArgs),
}

#[derive(Args, Debug)]
pub struct UploadArgs {
    /// Local file to upload.
    pub local_path: PathBuf,

    /// Destination folder id (default: root).
    #[arg(long)]
    pub parent_id: Option<u64>,

    /// Path under the destination folder; missing folders are created.
    #[arg(long)]
    pub relative_path: Option<String>,
}

#[derive(Args, Debug)]
pub struct FilestreamArgs {
    #[command(flatten)]
    pub upload: UploadArgs,

    /// Extra attempts after a transient failure (default from settings).
    #[arg(long)]
    pub retries: Option<u32>,
}

#[derive(Args, Debug)]
pub struct MkdirArgs {
    /// Name of the new folder.
    pub folder_name: String,

    /// Parent folder id (default: root).
    #[arg(long)]
    pub parent_id: Option<u64>,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Id of the entry to change.
    pub entry_id: u64,

    /// New name.
    #[arg(long)]
    pub name: Option<String>,

    /// New description.
    #[arg(long)]
    pub description: Option<String>,
}
