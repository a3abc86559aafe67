//! Values handed to applications after registration

use std::fmt;
use std::sync::Arc;

use crate::connector::{Connector, RedisConnection, RedisConnector};

/// One client, or every client in input order
pub enum Clients<T> {
    Single(Arc<T>),
    Multiple(Vec<Arc<T>>),
}

impl<T> Clients<T> {
    /// `Single` for exactly one client, `Multiple` otherwise
    pub fn new(mut clients: Vec<Arc<T>>) -> Self {
        if clients.len() == 1 {
            if let Some(client) = clients.pop() {
                return Clients::Single(client);
            }
        }
        Clients::Multiple(clients)
    }

    pub fn single(&self) -> Option<&Arc<T>> {
        match self {
            Clients::Single(client) => Some(client),
            Clients::Multiple(_) => None,
        }
    }

    pub fn get(&self, index: usize) -> Option<&Arc<T>> {
        self.iter().nth(index)
    }

    pub fn len(&self) -> usize {
        match self {
            Clients::Single(_) => 1,
            Clients::Multiple(clients) => clients.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every client, single or not
    pub fn iter(&self) -> impl Iterator<Item = &Arc<T>> {
        let slice = match self {
            Clients::Single(client) => std::slice::from_ref(client),
            Clients::Multiple(clients) => clients.as_slice(),
        };
        slice.iter()
    }
}

impl<T> Clone for Clients<T> {
    fn clone(&self) -> Self {
        match self {
            Clients::Single(client) => Clients::Single(Arc::clone(client)),
            Clients::Multiple(clients) => Clients::Multiple(clients.clone()),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Clients<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Clients::Single(client) => f.debug_tuple("Single").field(client).finish(),
            Clients::Multiple(clients) => f.debug_tuple("Multiple").field(clients).finish(),
        }
    }
}

/// `{client, lib}`: the opened client(s) plus the connector that opened them
pub struct Bundle<C: Connector> {
    pub client: Clients<C::Client>,
    pub lib: Arc<C>,
}

impl<C: Connector> Clone for Bundle<C> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            lib: Arc::clone(&self.lib),
        }
    }
}

impl<C: Connector> fmt::Debug for Bundle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bundle")
            .field("clients", &self.client.len())
            .finish_non_exhaustive()
    }
}

pub type RedisClients = Clients<RedisConnection>;
pub type RedisBundle = Bundle<RedisConnector>;
