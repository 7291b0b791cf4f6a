//! Connection-pool metadata adapter.
//!
//! Derives `(pool_size, idle_timeout, acquire_timeout)` from a heterogeneous
//! connection-pool product. Dispatch is on the product's class name; each
//! recognized product is accessed through its own typed facet rather than a
//! shared inheritance hierarchy. Invoked lazily by
//! [`DispatcherConfig::resolve`](crate::config::DispatcherConfig::resolve).

use std::time::Duration;

use crate::core::error::{Error, Result};

/// Settings derivable from a connection-pool product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    /// Maximum number of pooled connections.
    pub pool_size: usize,
    /// How long an idle connection is kept.
    pub idle_timeout: Duration,
    /// How long a caller may wait for a connection.
    pub acquire_timeout: Duration,
}

/// Facet of a HikariCP-style pool.
pub trait HikariFacet {
    /// `maximumPoolSize`.
    fn maximum_pool_size(&self) -> usize;
    /// `idleTimeout`, milliseconds.
    fn idle_timeout_ms(&self) -> u64;
    /// `connectionTimeout`, milliseconds.
    fn connection_timeout_ms(&self) -> u64;
}

/// Facet of a Commons-DBCP-style pool (including the Micronaut DBCP
/// configuration shape).
pub trait DbcpFacet {
    /// `maxTotal`.
    fn max_total(&self) -> usize;
    /// `softMinEvictableIdleTimeMillis`, milliseconds.
    fn soft_min_evictable_idle_time_ms(&self) -> u64;
    /// `validationQueryTimeout`, milliseconds.
    fn validation_query_timeout_ms(&self) -> u64;
}

/// Facet of a Tomcat-JDBC-style pool.
pub trait TomcatFacet {
    /// `maxActive`.
    fn max_active(&self) -> usize;
    /// `minEvictableIdleTimeMillis`, milliseconds.
    fn min_evictable_idle_time_ms(&self) -> u64;
    /// `validationQueryTimeout`, milliseconds.
    fn validation_query_timeout_ms(&self) -> u64;
}

/// Facet of an Oracle-UCP-style pool.
pub trait UcpFacet {
    /// `maxPoolSize`.
    fn max_pool_size(&self) -> usize;
    /// `inactiveConnectionTimeout`, seconds.
    fn inactive_connection_timeout_secs(&self) -> u64;
    /// `connectionWaitTimeout`, seconds.
    fn connection_wait_timeout_secs(&self) -> u64;
}

/// Facet of a transaction-aware proxy wrapping an unknown pool. Only the
/// login timeout is observable; the rest falls back to fixed values.
pub trait ProxyFacet {
    /// `loginTimeout`, seconds.
    fn login_timeout_secs(&self) -> u64;
}

/// A connection-pool product of unknown concrete type. The class name drives
/// registry dispatch; each facet accessor exposes one recognized shape.
pub trait PoolProduct: Send + Sync {
    /// Fully-qualified class name of the underlying product.
    fn class_name(&self) -> &str;

    /// Hikari facet, when the product has that shape.
    fn as_hikari(&self) -> Option<&dyn HikariFacet> {
        None
    }
    /// DBCP facet, when the product has that shape.
    fn as_dbcp(&self) -> Option<&dyn DbcpFacet> {
        None
    }
    /// Tomcat facet, when the product has that shape.
    fn as_tomcat(&self) -> Option<&dyn TomcatFacet> {
        None
    }
    /// UCP facet, when the product has that shape.
    fn as_ucp(&self) -> Option<&dyn UcpFacet> {
        None
    }
    /// Transaction-aware proxy facet, when the product has that shape.
    fn as_proxy(&self) -> Option<&dyn ProxyFacet> {
        None
    }
}

const PROXY_FALLBACK_POOL_SIZE: usize = 10;
const PROXY_FALLBACK_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

type Extractor = fn(&dyn PoolProduct) -> Option<PoolSettings>;

/// Suffix registry mapping recognized class names to their facet extractors.
const REGISTRY: &[(&[&str], Extractor)] = &[
    (&["HikariDataSource", "HikariUrlDataSource"], extract_hikari),
    (&["BasicDataSource", "DatasourceConfiguration"], extract_dbcp),
    (&["tomcat.jdbc.pool.DataSource"], extract_tomcat),
    (&["PoolDataSourceImpl", "PoolDataSource"], extract_ucp),
    (&["TransactionAwareDataSourceProxy"], extract_proxy),
];

fn extract_hikari(product: &dyn PoolProduct) -> Option<PoolSettings> {
    let facet = product.as_hikari()?;
    Some(PoolSettings {
        pool_size: facet.maximum_pool_size(),
        idle_timeout: Duration::from_millis(facet.idle_timeout_ms()),
        acquire_timeout: Duration::from_millis(facet.connection_timeout_ms()),
    })
}

fn extract_dbcp(product: &dyn PoolProduct) -> Option<PoolSettings> {
    let facet = product.as_dbcp()?;
    Some(PoolSettings {
        pool_size: facet.max_total(),
        idle_timeout: Duration::from_millis(facet.soft_min_evictable_idle_time_ms()),
        acquire_timeout: Duration::from_millis(facet.validation_query_timeout_ms()),
    })
}

fn extract_tomcat(product: &dyn PoolProduct) -> Option<PoolSettings> {
    let facet = product.as_tomcat()?;
    Some(PoolSettings {
        pool_size: facet.max_active(),
        idle_timeout: Duration::from_millis(facet.min_evictable_idle_time_ms()),
        acquire_timeout: Duration::from_millis(facet.validation_query_timeout_ms()),
    })
}

fn extract_ucp(product: &dyn PoolProduct) -> Option<PoolSettings> {
    let facet = product.as_ucp()?;
    Some(PoolSettings {
        pool_size: facet.max_pool_size(),
        idle_timeout: Duration::from_secs(facet.inactive_connection_timeout_secs()),
        acquire_timeout: Duration::from_secs(facet.connection_wait_timeout_secs()),
    })
}

fn extract_proxy(product: &dyn PoolProduct) -> Option<PoolSettings> {
    let facet = product.as_proxy()?;
    Some(PoolSettings {
        pool_size: PROXY_FALLBACK_POOL_SIZE,
        idle_timeout: PROXY_FALLBACK_IDLE_TIMEOUT,
        acquire_timeout: Duration::from_secs(facet.login_timeout_secs()),
    })
}

/// Derive pool settings from a connection-pool product.
///
/// # Errors
///
/// [`Error::UnknownPoolType`] when the class name is not in the registry or
/// the product does not expose the facet its class name promises.
pub fn derive_pool_settings(product: &dyn PoolProduct) -> Result<PoolSettings> {
    let class_name = product.class_name();
    for (suffixes, extract) in REGISTRY {
        if suffixes.iter().any(|suffix| class_name.ends_with(suffix)) {
            return extract(product)
                .ok_or_else(|| Error::UnknownPoolType(class_name.to_string()));
        }
    }
    Err(Error::UnknownPoolType(class_name.to_string()))
}
