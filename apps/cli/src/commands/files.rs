use std::path::Path;

use anyhow::Context as _;
use prismdrive_protocol::FileEntry;
use prismdrive_settings::{Settings, require_token};
use prismdrive_transfer::{
    Destination, FailureKind, FailureReport, RemoteTarget, TransferExecutor, TransferOutcome,
    validate_relative_path,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::{FilestreamArgs, MkdirArgs, UpdateArgs, UploadArgs};
use crate::context::Context;
use crate::exit::UploadFailed;
use crate::format::{destination_label, entry_lines, format_size};
use crate::progress::Reporter;

pub async fn upload(ctx: &Context, args: UploadArgs) -> anyhow::Result<()> {
    let token = require_token(&ctx.auth)?;
    if let Some(relative_path) = &args.relative_path {
        validate_relative_path(relative_path)?;
    }
    let client = ctx.api_client(Some(&token))?;

    announce(&args.local_path, local_size(&args.local_path).await, args.parent_id);
    let entry = client
        .upload_file(
            &args.local_path,
            args.parent_id,
            args.relative_path.as_deref(),
        )
        .await
        .context("upload failed")?;

    println!("✓ File uploaded successfully! File ID: {}", entry.id);
    print_entry(&entry);
    Ok(())
}

pub async fn filestream(ctx: &Context, args: FilestreamArgs) -> anyhow::Result<()> {
    let token = require_token(&ctx.auth)?;
    let executor = ctx.executor()?;
    let target = RemoteTarget::new(ctx.base_url.clone(), token);

    let UploadArgs {
        local_path,
        parent_id,
        relative_path,
    } = args.upload;
    let mut destination = match parent_id {
        Some(id) => Destination::folder(id),
        None => Destination::root(),
    };
    if let Some(relative_path) = relative_path {
        destination = destination.with_relative_path(relative_path);
    }
    let retries = args.retries.unwrap_or(ctx.settings.retries);

    let size = local_size(&local_path).await;
    announce(&local_path, size, parent_id);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let label = display_name(&local_path);
    let mut reporter = Reporter::new(&label, size.unwrap_or(0));
    let outcome = stream_with_retries(
        &executor,
        &target,
        &local_path,
        &destination,
        &ctx.settings,
        retries,
        &mut reporter,
        &cancel,
    )
    .await;
    watcher.abort();

    match outcome {
        TransferOutcome::Completed { entry, bytes } => {
            reporter.finish();
            info!(id = entry.id, bytes, "stream upload finished");
            println!(
                "✓ File streamed and uploaded successfully! File ID: {}",
                entry.id
            );
            print_entry(&entry);
            Ok(())
        }
        TransferOutcome::Failed(report) => {
            reporter.abandon();
            Err(UploadFailed { report }.into())
        }
    }
}

/// Streams `path`, retrying transient failures with a fresh source each time.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn stream_with_retries(
    executor: &TransferExecutor,
    target: &RemoteTarget,
    path: &Path,
    destination: &Destination,
    settings: &Settings,
    retries: u32,
    reporter: &mut Reporter,
    cancel: &CancellationToken,
) -> TransferOutcome {
    let attempts = retries.saturating_add(1);
    let mut attempt = 1;
    loop {
        let outcome = prismdrive_transfer::upload(
            executor,
            target,
            path,
            destination,
            |sent, total| reporter.update(sent, total),
            cancel,
        )
        .await;

        let report = match outcome {
            TransferOutcome::Failed(report) if report.is_retryable() && attempt < attempts => {
                report
            }
            other => return other,
        };

        let delay = settings.retry_delay(attempt);
        warn!(attempt, attempts, kind = %report.kind, "upload attempt failed; retrying");
        reporter.note(&format!(
            "Attempt {attempt} of {attempts} failed: {report}. Retrying in {:.1}s...",
            delay.as_secs_f64()
        ));

        tokio::select! {
            _ = cancel.cancelled() => {
                return TransferOutcome::Failed(FailureReport {
                    kind: FailureKind::Cancelled,
                    status: None,
                    message: format!("upload cancelled while waiting to retry (attempt {attempt} of {attempts})"),
                    details: Vec::new(),
                    bytes_sent: 0,
                    total_bytes: report.total_bytes,
                });
            }
            _ = tokio::time::sleep(delay) => {}
        }
        reporter.restart();
        attempt += 1;
    }
}

pub async fn mkdir(ctx: &Context, args: MkdirArgs) -> anyhow::Result<()> {
    let token = require_token(&ctx.auth)?;
    let client = ctx.api_client(Some(&token))?;

    println!(
        "Creating folder '{}' in {}...",
        args.folder_name,
        destination_label(args.parent_id)
    );
    let entry = client
        .create_folder(&args.folder_name, args.parent_id)
        .await
        .context("could not create folder")?;

    println!("✓ Folder created successfully! Folder ID: {}", entry.id);
    println!("  Name: {}", entry.name);
    Ok(())
}

pub async fn update(ctx: &Context, args: UpdateArgs) -> anyhow::Result<()> {
    let token = require_token(&ctx.auth)?;
    let client = ctx.api_client(Some(&token))?;

    println!("Updating entry {}...", args.entry_id);
    let entry = client
        .update_entry(
            args.entry_id,
            args.name.as_deref(),
            args.description.as_deref(),
        )
        .await
        .context("could not update entry")?;

    println!("✓ Entry updated successfully! ID: {}", entry.id);
    print_entry(&entry);
    Ok(())
}

fn announce(path: &Path, size: Option<u64>, parent_id: Option<u64>) {
    let name = display_name(path);
    match size {
        Some(size) => println!("Uploading {name} ({}) to PrismDrive...", format_size(size)),
        None => println!("Uploading {name} to PrismDrive..."),
    }
    println!("Destination: {}", destination_label(parent_id));
}

fn print_entry(entry: &FileEntry) {
    for line in entry_lines(entry) {
        println!("{line}");
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Size for display only; open errors are reported by the upload itself.
async fn local_size(path: &Path) -> Option<u64> {
    tokio::fs::metadata(path).await.ok().map(|m| m.len())
}
