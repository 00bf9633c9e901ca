// handlers/protected/auth/user.rs - GET /api/user handler

use crate::middleware::{ApiResponse, AuthUser};
use crate::session::UserProfile;

/// GET /api/user - Profile of the authenticated user
///
/// 2xx iff the request carries a live session cookie or a valid bearer
/// token; the login page uses this as its "already signed in?" probe.
pub async fn current_user(auth: AuthUser) -> ApiResponse<UserProfile> {
    ApiResponse::success(auth.user.profile())
}
