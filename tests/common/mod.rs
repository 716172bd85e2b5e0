#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Header of the richest export format.
pub const FULL_HEADER: &str =
    "Transaction_ID,Date,Product_Category,Product_Name,Revenue_EUR,Refund_Amount,Has_Return";

/// The two-row dashboard scenario: one clean sale in A, one fully refunded return in B.
pub const SCENARIO_ROWS: &[&str] = &[
    "1,2024-01-01,A,Lamp,100,0,0",
    "2,2024-01-02,B,Chair,50,50,1",
];

/// Write `header` and `rows` to `name` inside `dir`, one line each.
pub fn write_csv(dir: &Path, name: &str, header: &str, rows: &[&str]) -> PathBuf {
    let path = dir.join(name);
    let mut content = String::from(header);
    content.push('\n');
    for row in rows {
        content.push_str(row);
        content.push('\n');
    }
    fs::write(&path, content).expect("Failed to write test CSV");
    path
}

pub fn scenario_csv() -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = write_csv(dir.path(), "sales.csv", FULL_HEADER, SCENARIO_ROWS);
    (dir, path)
}

/// A larger export with dirty cells, several days and repeated products.
pub fn dirty_csv() -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = write_csv(
        dir.path(),
        "dirty.csv",
        FULL_HEADER,
        &[
            "10,2024-03-01 09:15:00,Home,Lamp,120.50,0,0",
            "11,2024-03-01 17:40:00,Home,Rug,80,20,1",
            "12,2024-03-02,Garden,Hose,n/a,0,0",
            "13,not a date,Garden,Hose,40,40,1",
            "14,2024-03-03,,Mug,15,0,0",
            "15,2024-03-03,Home,Lamp,120.50,60,yes",
            "15,2024-03-03,Home,Lamp,0,0,0",
        ],
    );
    (dir, path)
}
