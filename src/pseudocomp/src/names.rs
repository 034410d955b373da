// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::sync::{Arc, Mutex};

use lazy_static::lazy_static;

pub const DEFAULT_PREFIX: &str = "_pseudo_";

/// NameAllocator hands out identifiers for synthetic graph nodes.  A
/// name is never handed out twice by the same allocator.
pub trait NameAllocator: Send + Sync {
    fn next_name(&self) -> String;
}

/// SequentialNames produces `<prefix>0`, `<prefix>1`, ...
#[derive(Debug)]
pub struct SequentialNames {
    prefix: String,
    count: Mutex<u64>,
}

impl SequentialNames {
    pub fn new(prefix: &str) -> Self {
        SequentialNames {
            prefix: prefix.to_owned(),
            count: Mutex::new(0),
        }
    }
}

impl Default for SequentialNames {
    fn default() -> Self {
        SequentialNames::new(DEFAULT_PREFIX)
    }
}

impl NameAllocator for SequentialNames {
    fn next_name(&self) -> String {
        // a panic elsewhere can't leave the counter half-updated
        let mut count = self.count.lock().unwrap_or_else(|e| e.into_inner());
        let name = format!("{}{}", self.prefix, *count);
        *count += 1;
        name
    }
}

lazy_static! {
    static ref GLOBAL_NAMES: Arc<SequentialNames> = Arc::new(SequentialNames::default());
}

/// global returns the process-wide allocator used when a builder isn't
/// given one of its own.
pub fn global() -> Arc<dyn NameAllocator> {
    GLOBAL_NAMES.clone()
}
