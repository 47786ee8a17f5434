//! Expiring secrets.

use std::time::Duration;
use tokio::time::Instant;
use zeroize::Zeroizing;

/// What a lease protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseKind {
    /// The secret store login token
    Auth,
    /// The database credentials
    Resource,
}

/// A secret with a limited lifetime.
#[derive(Clone)]
pub struct Lease {
    kind: LeaseKind,
    id: String,
    secret: Zeroizing<String>,
    renewable: bool,
    duration: Duration,
    issued_at: Instant,
    expires_at: Instant,
}

impl Lease {
    /// `id` is safe to log; `secret` is what renewal presents.
    pub fn new(
        kind: LeaseKind,
        id: impl Into<String>,
        secret: impl Into<String>,
        renewable: bool,
        duration: Duration,
    ) -> Self {
        let issued_at = Instant::now();
        Self {
            kind,
            id: id.into(),
            secret: Zeroizing::new(secret.into()),
            renewable,
            duration,
            issued_at,
            expires_at: issued_at + duration,
        }
    }

    pub fn kind(&self) -> LeaseKind {
        self.kind
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn renewable(&self) -> bool {
        self.renewable
    }

    /// Lifetime granted at issue.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn issued_at(&self) -> Instant {
        self.issued_at
    }

    /// Moves forward on every renewal.
    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }

    /// Record a renewal that left `remaining` on the lease.
    ///
    /// The granted [`duration`](Self::duration) is kept.
    pub fn renewed(&mut self, remaining: Duration) {
        self.expires_at = Instant::now() + remaining;
    }
}

impl std::fmt::Debug for Lease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .field("secret", &"[REDACTED]")
            .field("renewable", &self.renewable)
            .field("duration", &self.duration)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_remaining() {
        let lease = Lease::new(
            LeaseKind::Resource,
            "db/1",
            "db/1",
            true,
            Duration::from_secs(60),
        );
        tokio::time::advance(Duration::from_secs(20)).await;
        assert_eq!(lease.remaining(), Duration::from_secs(40));

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(lease.remaining(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_renewal_extends_remaining() {
        let mut lease = Lease::new(
            LeaseKind::Auth,
            "a1",
            "s.token",
            true,
            Duration::from_secs(60),
        );
        tokio::time::advance(Duration::from_secs(90)).await;
        assert_eq!(lease.remaining(), Duration::ZERO);

        lease.renewed(Duration::from_secs(45));
        assert_eq!(lease.remaining(), Duration::from_secs(45));
        assert_eq!(lease.duration(), Duration::from_secs(60));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let lease = Lease::new(
            LeaseKind::Auth,
            "accessor",
            "s.token",
            true,
            Duration::from_secs(1),
        );
        let debug = format!("{:?}", lease);
        assert!(debug.contains("accessor"));
        assert!(!debug.contains("s.token"));
    }
}
