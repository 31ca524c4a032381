// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use promptsort::dispatch::{resolve, ActionMode, MultiMatchMode, Operation};
use promptsort::matcher::match_keywords;
use promptsort::metadata::parse_prompt_from_parameters;

#[derive(Arbitrary, Debug)]
struct Input {
    parameters: String,
    keywords: Vec<String>,
    move_files: bool,
    mode: u8,
}

fuzz_target!(|input: Input| {
    let prompt = parse_prompt_from_parameters(&input.parameters);
    let matched = match_keywords(&prompt, &input.keywords);
    assert!(matched.len() <= input.keywords.len());

    let action = if input.move_files { ActionMode::Move } else { ActionMode::Copy };
    let multi = match input.mode % 3 {
        0 => MultiMatchMode::First,
        1 => MultiMatchMode::Duplicate,
        _ => MultiMatchMode::Skip,
    };
    let pairs = resolve(&matched, action, multi, "no_match");
    assert!(!pairs.is_empty());
    let moves = pairs.iter().filter(|p| p.operation == Operation::Move).count();
    assert!(moves <= 1);
    if moves == 1 {
        assert_eq!(pairs.last().map(|p| p.operation), Some(Operation::Move));
    }
});
