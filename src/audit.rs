/// Logs a security/authentication event.
///
/// Wraps `tracing::info!`, stamping the event with `audit = true`,
/// `auditType = "authentication"`, and the current request's endpoint,
/// host, and method from the request context.
///
/// # Examples
///
/// ```ignore
/// audit!("login flow started for client {}", client_id);
/// ```
#[macro_export]
macro_rules! audit {
    ($($arg:tt)+) => {
        $crate::middleware::with_request_info(|ctx| {
            tracing::info!(
                audit = true,
                auditType = "authentication",
                endpoint = %ctx.endpoint,
                host = %ctx.host,
                httpMethod = %ctx.method,
                $($arg)+
            )
        })
    };
}
