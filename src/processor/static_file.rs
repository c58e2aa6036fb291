//! Static filesystem serving: regular files, index candidate walks,
//! directory listings, and DELETE.

use std::fs;
use std::io;

use crate::fs_path::{PathError, PhysicalPath};
use crate::http::{content_type_for_path, HttpResponse, HttpStatus, Method};
use crate::router::LocationRouting;
use crate::server::BodySource;

use super::autoindex::build_autoindex_body;
use super::ProcessorOutput;

/// Serves the `serve-static` / `serve-autoindex` actions (and DELETE on
/// static paths). A returned error status goes through the caller's
/// error-page machinery.
pub fn handle_static(
    routing: &LocationRouting,
    status_for_success: HttpStatus,
    response: &mut HttpResponse,
) -> Result<ProcessorOutput, HttpStatus> {
    let target = routing.resolve_physical(false).map_err(map_path_error)?;

    let meta = fs::metadata(target.as_path()).map_err(|_| HttpStatus::NOT_FOUND)?;

    if routing.method() == Method::Delete {
        return handle_delete(&target, &meta, response);
    }

    if meta.is_dir() {
        return handle_directory(routing, status_for_success, response);
    }

    if !meta.is_file() {
        return Err(HttpStatus::NOT_FOUND);
    }

    respond_file(&target, meta.len(), status_for_success, response)
}

fn handle_delete(
    target: &PhysicalPath,
    meta: &fs::Metadata,
    response: &mut HttpResponse,
) -> Result<ProcessorOutput, HttpStatus> {
    if meta.is_dir() {
        return Err(HttpStatus::FORBIDDEN);
    }
    if !meta.is_file() {
        return Err(HttpStatus::NOT_FOUND);
    }
    match fs::remove_file(target.as_path()) {
        Ok(()) => {
            response
                .set_status(HttpStatus::NO_CONTENT)
                .map_err(|_| HttpStatus::SERVER_ERROR)?;
            response
                .set_expected_content_length(0)
                .map_err(|_| HttpStatus::SERVER_ERROR)?;
            Ok(ProcessorOutput {
                body: None,
                should_close: false,
            })
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(HttpStatus::NOT_FOUND),
        Err(_) => Err(HttpStatus::FORBIDDEN),
    }
}

fn handle_directory(
    routing: &LocationRouting,
    status_for_success: HttpStatus,
    response: &mut HttpResponse,
) -> Result<ProcessorOutput, HttpStatus> {
    let has_trailing_slash = routing.path().ends_with('/');

    if has_trailing_slash {
        let ctx = routing.autoindex_context().map_err(map_path_error)?;

        for candidate in &ctx.index_candidates {
            let meta = match fs::metadata(candidate.as_path()) {
                Ok(meta) => meta,
                Err(_) => continue,
            };
            if !meta.is_file() {
                continue;
            }
            return respond_file(candidate, meta.len(), status_for_success, response);
        }

        if ctx.autoindex_enabled {
            let body = build_autoindex_body(&ctx).map_err(|_| HttpStatus::FORBIDDEN)?;
            response
                .set_status(status_for_success)
                .map_err(|_| HttpStatus::SERVER_ERROR)?;
            response
                .set_header("Content-Type", "text/html")
                .map_err(|_| HttpStatus::SERVER_ERROR)?;
            response
                .set_expected_content_length(body.len() as u64)
                .map_err(|_| HttpStatus::SERVER_ERROR)?;
            return Ok(ProcessorOutput {
                body: Some(BodySource::from_bytes(body.into_bytes())),
                should_close: false,
            });
        }
    }

    // A directory with no usable index: with the trailing slash this is a
    // refusal to list (403); without it the request named a file that is
    // not there (404).
    Err(if has_trailing_slash {
        HttpStatus::FORBIDDEN
    } else {
        HttpStatus::NOT_FOUND
    })
}

/// Streams a regular file: status, Content-Type from the extension,
/// Content-Length from the inode size.
pub fn respond_file(
    path: &PhysicalPath,
    size: u64,
    status: HttpStatus,
    response: &mut HttpResponse,
) -> Result<ProcessorOutput, HttpStatus> {
    let file = fs::File::open(path.as_path()).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => HttpStatus::NOT_FOUND,
        io::ErrorKind::PermissionDenied => HttpStatus::FORBIDDEN,
        _ => HttpStatus::SERVER_ERROR,
    })?;

    response
        .set_status(status)
        .map_err(|_| HttpStatus::SERVER_ERROR)?;
    response
        .set_header("Content-Type", content_type_for_path(path.as_str()))
        .map_err(|_| HttpStatus::SERVER_ERROR)?;
    response
        .set_expected_content_length(size)
        .map_err(|_| HttpStatus::SERVER_ERROR)?;

    Ok(ProcessorOutput {
        body: Some(BodySource::from_file(file, size)),
        should_close: false,
    })
}

fn map_path_error(e: PathError) -> HttpStatus {
    match e {
        PathError::NotFound => HttpStatus::NOT_FOUND,
        PathError::SymlinkEscape => HttpStatus::FORBIDDEN,
        PathError::Invalid => HttpStatus::BAD_REQUEST,
    }
}
