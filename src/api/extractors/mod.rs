/*!
 * Request extractors
 *
 * Responsibility:
 * - hand the handler what the transport carries (bearer token, request id)
 * - never reject: authentication decisions belong to the dispatcher hooks
 */

mod bearer;
mod request_id;

pub use bearer::BearerCredentials;
pub use request_id::RequestId;
