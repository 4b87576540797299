// ==============================================================================
// lib.rs - Summary Statistics Processor Library
// ==============================================================================
// Description: Library interface for GWAS summary-statistics pipeline modules
// Author: Matt Barham
// Created: 2026-10-17
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================

pub mod parsers;
pub mod run_log;
pub mod validator;
pub mod models;
pub mod config;
pub mod discovery;
pub mod catalog;
pub mod external;
pub mod encoding;
pub mod consolidate;
pub mod tabix;
pub mod matcher;
