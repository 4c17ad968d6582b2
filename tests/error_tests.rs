// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use lms_insights::error::AppError;
use lms_insights::models::{ActivityKey, ActivityType};

#[test]
fn test_is_rate_limited_matches() {
    let err = AppError::ModelApi(AppError::RATE_LIMITED.to_string());
    assert!(err.is_rate_limited());

    let err = AppError::LmsApi(format!("{} (classroom c1)", AppError::RATE_LIMITED));
    assert!(err.is_rate_limited());
}

#[test]
fn test_is_rate_limited_no_match() {
    let err = AppError::ModelApi("HTTP 500: overloaded".to_string());
    assert!(!err.is_rate_limited());

    let err = AppError::Database(AppError::RATE_LIMITED.to_string());
    assert!(!err.is_rate_limited());

    assert!(!AppError::EmptyResponse.is_rate_limited());
}

#[test]
fn test_is_rate_limited_ignores_bare_429_digits() {
    let err = AppError::LmsApi("HTTP 404: discussion 4291 not found".to_string());
    assert!(!err.is_rate_limited());

    let err = AppError::ModelApi("HTTP 500: request id req_0429a failed".to_string());
    assert!(!err.is_rate_limited());
}

#[test]
fn test_with_activity_prefixes_identity() {
    let key = ActivityKey {
        classroom_id: "c1".to_string(),
        course_id: "101".to_string(),
        activity_id: "55".to_string(),
        activity_type: ActivityType::Forum,
    };
    let err = AppError::LmsApi("HTTP 503".to_string());
    assert_eq!(err.with_activity(&key), "[c1/101/55 forum] LMS API error: HTTP 503");
}
