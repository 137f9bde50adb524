#![no_main]

use crashparse::extractors::{anr, fabric, java, panic, tombstone};
use crashparse::readers::LineReader;
use libfuzzer_sys::fuzz_target;
use std::io::Cursor;

fuzz_target!(|data: &[u8]| {
    // Every scanner must accept arbitrary bytes, including invalid UTF-8.
    let reader = || LineReader::new(Cursor::new(data));

    let _ = panic::scan_console(&mut reader());
    let _ = tombstone::scan_tombstone(&mut reader());
    let _ = java::scan_java_crash(&mut reader());
    let _ = anr::scan_anr(&mut reader());
    let _ = fabric::scan_flat(&mut reader(), data.first().is_some_and(|b| b & 1 == 1));
    let _ = fabric::scan_sectioned(&mut reader(), data.last().is_some_and(|b| b & 1 == 1));
});
