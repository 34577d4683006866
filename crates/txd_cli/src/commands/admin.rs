//! Status and invalid-list commands.

use txd_client::TransactionSystemClient;

/// Prints the service status.
pub fn status(address: &str) -> Result<(), Box<dyn std::error::Error>> {
    let status = super::connect(address).status()?;
    println!("{}", status.as_str());
    Ok(())
}

/// Prints the size of the invalid list.
pub fn invalid_size(address: &str) -> Result<(), Box<dyn std::error::Error>> {
    let size = super::connect(address).invalid_size()?;
    println!("{size}");
    Ok(())
}

/// Removes entries from the invalid list by id or by start time.
pub fn truncate_invalid(
    address: &str,
    ids: &[i64],
    before: Option<i64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = super::connect(address);
    let removed = match before {
        Some(time_millis) => client.truncate_invalid_tx_before(time_millis)?,
        None if !ids.is_empty() => client.truncate_invalid_tx(ids)?,
        None => return Err("either --ids or --before is required".into()),
    };
    if removed {
        println!("Invalid list truncated");
    } else {
        println!("Nothing to truncate");
    }
    Ok(())
}
