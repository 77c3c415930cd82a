use std::sync::mpsc::Sender;

use crate::chain::ChainLink;

/// Receives every link a chain records, the starting point included.
pub trait ChainObserver {
    fn link_recorded(&mut self, _chain_id: u64, _link: &ChainLink) {}
}

/// Ignores all notifications.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl ChainObserver for NullObserver {}

impl<F: FnMut(u64, &ChainLink)> ChainObserver for F {
    fn link_recorded(&mut self, chain_id: u64, link: &ChainLink) {
        self(chain_id, link)
    }
}

/// Forwards copies of the recorded links to a channel.
///
/// Sending never blocks the chain. A closed receiver is ignored.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    sender: Sender<(u64, ChainLink)>,
}

impl ChannelObserver {
    pub fn new(sender: Sender<(u64, ChainLink)>) -> Self {
        Self { sender }
    }
}

impl ChainObserver for ChannelObserver {
    fn link_recorded(&mut self, chain_id: u64, link: &ChainLink) {
        let _ = self.sender.send((chain_id, link.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ChainState;
    use pretty_assertions::assert_eq;
    use std::sync::mpsc::channel;

    fn link(iteration: u64) -> ChainLink {
        ChainLink {
            iteration,
            state: ChainState::Mcmc,
            values: vec![1., 2.].into(),
            score: 3.,
            prior: 0.,
            likelihood: 3.,
            penalty: 0.,
            additional_prior: 0.,
            jacobian: 0.,
            step_size: 0.5,
            acceptance_rate: 0.25,
            acceptance_rate_since_adapt: 0.2,
        }
    }

    #[test]
    fn channel_delivers_links() {
        let (tx, rx) = channel();
        let mut observer = ChannelObserver::new(tx);
        observer.link_recorded(3, &link(10));
        observer.link_recorded(3, &link(20));
        let received: Vec<_> = rx.try_iter().map(|(chain, link)| (chain, link.iteration)).collect();
        assert_eq!(received, vec![(3, 10), (3, 20)]);
    }

    #[test]
    fn closed_channel_is_ignored() {
        let (tx, rx) = channel();
        drop(rx);
        let mut observer = ChannelObserver::new(tx);
        observer.link_recorded(0, &link(1));
    }

    #[test]
    fn closures_observe() {
        let mut seen = Vec::new();
        {
            let mut observer = |chain: u64, link: &ChainLink| seen.push((chain, link.iteration));
            observer.link_recorded(1, &link(5));
        }
        assert_eq!(seen, vec![(1, 5)]);
    }
}
