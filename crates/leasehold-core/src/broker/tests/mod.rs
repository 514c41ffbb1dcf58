use super::*;
use crate::clock::ManualClock;
use crate::error::{StorageError, ValidationError};
use crate::message::MessageState;
use crate::storage::SqliteStorage;

mod common;
use common::*;
