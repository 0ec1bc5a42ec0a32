//! The epoll reactor.
//!
//! Single-threaded and cooperative: fd callbacks run to completion and
//! may not re-enter the loop. Structural changes requested from inside
//! a callback (adding or removing fds, stopping) go through the
//! `LoopControl` handed to it and are applied between callbacks.

use std::collections::HashMap;
use std::os::fd::{BorrowedFd, RawFd};

use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags, EpollTimeout};

use crate::core::errors::ServerError;

/// What epoll reported for an fd.
#[derive(Debug, Clone, Copy)]
pub struct Readiness {
    pub readable: bool,
    pub hangup: bool,
}

pub type FdCallback<C> = fn(&mut C, &mut LoopControl<C>, RawFd, Readiness);
pub type PostStepFn<C> = fn(&mut C, &mut LoopControl<C>);

/// Deferred structural changes collected during a dispatch step.
pub struct LoopControl<C> {
    additions: Vec<(RawFd, FdCallback<C>)>,
    removals: Vec<RawFd>,
    stop: bool,
}

impl<C> Default for LoopControl<C> {
    fn default() -> Self {
        LoopControl { additions: Vec::new(), removals: Vec::new(), stop: false }
    }
}

impl<C> LoopControl<C> {
    pub fn add_fd(&mut self, fd: RawFd, callback: FdCallback<C>) {
        self.additions.push((fd, callback));
    }

    pub fn remove_fd(&mut self, fd: RawFd) {
        self.removals.push(fd);
    }

    pub fn stop(&mut self) {
        self.stop = true;
    }
}

pub struct EventLoop<C> {
    epoll: Epoll,
    handlers: HashMap<RawFd, FdCallback<C>>,
    post_step: Vec<PostStepFn<C>>,
    running: bool,
}

impl<C> EventLoop<C> {
    pub fn new() -> Result<Self, ServerError> {
        let epoll = Epoll::new(EpollCreateFlags::EPOLL_CLOEXEC)
            .map_err(|errno| ServerError::EventLoop(std::io::Error::from_raw_os_error(errno as i32)))?;
        Ok(EventLoop { epoll, handlers: HashMap::new(), post_step: Vec::new(), running: false })
    }

    /// Register an fd for read readiness. The caller keeps ownership of
    /// the descriptor and must remove it before closing.
    pub fn add_fd(&mut self, fd: RawFd, callback: FdCallback<C>) -> Result<(), ServerError> {
        let event = EpollEvent::new(EpollFlags::EPOLLIN, fd as u64);
        // The registry only sees borrowed fds; their owners outlive the
        // registration by the removal discipline above.
        let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
        self.epoll
            .add(borrowed, event)
            .map_err(|errno| ServerError::EventLoop(std::io::Error::from_raw_os_error(errno as i32)))?;
        self.handlers.insert(fd, callback);
        Ok(())
    }

    pub fn remove_fd(&mut self, fd: RawFd) {
        if self.handlers.remove(&fd).is_some() {
            let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
            if let Err(errno) = self.epoll.delete(borrowed) {
                tracing::warn!("epoll delete for fd {} failed: {}", fd, errno);
            }
        }
    }

    pub fn add_post_step(&mut self, hook: PostStepFn<C>) {
        self.post_step.push(hook);
    }

    fn apply(&mut self, control: LoopControl<C>) -> Result<bool, ServerError> {
        for fd in control.removals {
            self.remove_fd(fd);
        }
        for (fd, callback) in control.additions {
            self.add_fd(fd, callback)?;
        }
        Ok(control.stop)
    }

    /// Dispatch until a callback or post-step hook asks to stop.
    pub fn run(&mut self, ctx: &mut C) -> Result<(), ServerError> {
        self.running = true;
        let mut events = [EpollEvent::empty(); 32];

        while self.running {
            let count = match self.epoll.wait(&mut events, EpollTimeout::NONE) {
                Ok(count) => count,
                Err(nix::errno::Errno::EINTR) => continue,
                Err(errno) => {
                    return Err(ServerError::EventLoop(std::io::Error::from_raw_os_error(
                        errno as i32,
                    )))
                }
            };

            for event in &events[..count] {
                let fd = event.data() as RawFd;
                let flags = event.events();
                let readiness = Readiness {
                    readable: flags.intersects(EpollFlags::EPOLLIN),
                    hangup: flags.intersects(EpollFlags::EPOLLHUP | EpollFlags::EPOLLERR),
                };

                let Some(&callback) = self.handlers.get(&fd) else {
                    // Removed by an earlier callback in this batch.
                    continue;
                };

                let mut control = LoopControl::default();
                callback(ctx, &mut control, fd, readiness);
                if self.apply(control)? {
                    self.running = false;
                }
            }

            let mut control = LoopControl::default();
            for hook in &self.post_step {
                hook(ctx, &mut control);
            }
            if self.apply(control)? {
                self.running = false;
            }
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::fd::AsRawFd;
    use std::os::unix::net::UnixStream;

    struct Ctx {
        reads: Vec<RawFd>,
        stream: UnixStream,
        steps: u32,
    }

    fn on_readable(ctx: &mut Ctx, control: &mut LoopControl<Ctx>, fd: RawFd, readiness: Readiness) {
        assert!(readiness.readable);
        ctx.reads.push(fd);
        let mut buf = [0u8; 16];
        use std::io::Read;
        let _ = ctx.stream.read(&mut buf);
        control.stop();
    }

    fn post_step(ctx: &mut Ctx, _control: &mut LoopControl<Ctx>) {
        ctx.steps += 1;
    }

    #[test]
    fn test_dispatches_readable_fd_and_post_step() {
        let (mut writer, reader) = UnixStream::pair().unwrap();
        let reader_fd = reader.as_raw_fd();

        let mut event_loop = EventLoop::<Ctx>::new().unwrap();
        event_loop.add_fd(reader_fd, on_readable).unwrap();
        event_loop.add_post_step(post_step);

        writer.write_all(b"ping").unwrap();

        let mut ctx = Ctx { reads: Vec::new(), stream: reader, steps: 0 };
        event_loop.run(&mut ctx).unwrap();

        assert_eq!(ctx.reads, vec![reader_fd]);
        assert_eq!(ctx.steps, 1);
    }

    #[test]
    fn test_remove_fd_is_idempotent() {
        let (_writer, reader) = UnixStream::pair().unwrap();
        let mut event_loop = EventLoop::<Ctx>::new().unwrap();
        event_loop.add_fd(reader.as_raw_fd(), on_readable).unwrap();
        event_loop.remove_fd(reader.as_raw_fd());
        event_loop.remove_fd(reader.as_raw_fd());
    }
}
