//! Check command implementation.

use tracing::info;
use txd_client::{TransactionServiceClient, TransactionSystemClient};

/// Runs one short transaction through start, conflict check and commit.
pub fn run(address: &str) -> Result<(), Box<dyn std::error::Error>> {
    let client = super::connect(address);
    check(&client)?;
    println!("OK");
    Ok(())
}

fn check(client: &TransactionServiceClient) -> Result<(), Box<dyn std::error::Error>> {
    let tx = client.start_short()?;
    info!(
        write_pointer = tx.write_pointer(),
        read_pointer = tx.read_pointer(),
        invalids = tx.invalids().len(),
        in_progress = tx.in_progress().len(),
        "started transaction"
    );

    if client.can_commit(&tx, &[])? {
        info!(write_pointer = tx.write_pointer(), "no conflicts");
        if client.commit(&tx)? {
            info!(write_pointer = tx.write_pointer(), "committed transaction");
            return Ok(());
        }
    }

    client.abort(&tx)?;
    info!(write_pointer = tx.write_pointer(), "aborted transaction");
    Err("transaction could not be committed".into())
}
