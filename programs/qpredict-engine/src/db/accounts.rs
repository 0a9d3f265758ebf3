use crate::errors::{EngineError, EngineResult};
use crate::state::account::Account;
use rusqlite::{params, Connection, OptionalExtension, Row};

fn row_to_account(row: &Row) -> rusqlite::Result<Account> {
    Ok(Account {
        address: row.get("address")?,
        display_name: row.get("display_name")?,
        balance_qu: row.get("balance_qu")?,
        total_deposited_qu: row.get("total_deposited_qu")?,
        total_withdrawn_qu: row.get("total_withdrawn_qu")?,
        total_bet_qu: row.get("total_bet_qu")?,
        total_won_qu: row.get("total_won_qu")?,
    })
}

pub fn get_or_create(conn: &Connection, address: &str) -> EngineResult<Account> {
    if let Some(account) = get_account(conn, address)? {
        return Ok(account);
    }
    let account = Account::new(address);
    conn.execute(
        "INSERT INTO accounts (address, display_name, balance_qu, total_deposited_qu, total_withdrawn_qu, total_bet_qu, total_won_qu)
         VALUES (?1, ?2, 0, 0, 0, 0, 0)",
        params![account.address, account.display_name],
    )?;
    Ok(account)
}

pub fn get_account(conn: &Connection, address: &str) -> EngineResult<Option<Account>> {
    conn.query_row(
        "SELECT * FROM accounts WHERE address = ?1",
        params![address],
        row_to_account,
    )
    .optional()
    .map_err(EngineError::from)
}

pub fn list_accounts(conn: &Connection) -> EngineResult<Vec<Account>> {
    let mut stmt = conn.prepare("SELECT * FROM accounts")?;
    let rows = stmt
        .query_map([], row_to_account)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn credit_deposit(conn: &Connection, address: &str, amount_qu: i64) -> EngineResult<()> {
    get_or_create(conn, address)?;
    conn.execute(
        "UPDATE accounts SET balance_qu = balance_qu + ?1, total_deposited_qu = total_deposited_qu + ?1
         WHERE address = ?2",
        params![amount_qu, address],
    )?;
    Ok(())
}

pub fn debit_bet(conn: &Connection, address: &str, amount_qu: i64) -> EngineResult<()> {
    conn.execute(
        "UPDATE accounts SET balance_qu = balance_qu - ?1, total_bet_qu = total_bet_qu + ?1
         WHERE address = ?2",
        params![amount_qu, address],
    )?;
    Ok(())
}

pub fn credit_payout(conn: &Connection, address: &str, amount_qu: i64) -> EngineResult<()> {
    get_or_create(conn, address)?;
    conn.execute(
        "UPDATE accounts SET balance_qu = balance_qu + ?1, total_won_qu = total_won_qu + ?1
         WHERE address = ?2",
        params![amount_qu, address],
    )?;
    Ok(())
}

pub fn debit_withdrawal(conn: &Connection, address: &str, amount_qu: i64) -> EngineResult<()> {
    conn.execute(
        "UPDATE accounts SET balance_qu = balance_qu - ?1, total_withdrawn_qu = total_withdrawn_qu + ?1
         WHERE address = ?2",
        params![amount_qu, address],
    )?;
    Ok(())
}
