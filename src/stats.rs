/**************************************************************************/
/*  This file is part of PROTOCNF.                                        */
/*                                                                        */
/*  Copyright (C) 2025                                                    */
/*    CEA (Commissariat à l'énergie atomique et aux énergies              */
/*         alternatives)                                                  */
/*                                                                        */
/*  you can redistribute it and/or modify it under the terms of the GNU   */
/*  Lesser General Public License as published by the Free Software       */
/*  Foundation, version 2.1.                                              */
/*                                                                        */
/*  It is distributed in the hope that it will be useful,                 */
/*  but WITHOUT ANY WARRANTY; without even the implied warranty of        */
/*  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the         */
/*  GNU Lesser General Public License for more details.                   */
/*                                                                        */
/*  See the GNU Lesser General Public License version 2.1                 */
/*  for more details (enclosed in the file licenses/LGPLv2.1).            */
/*                                                                        */
/**************************************************************************/

//! Collection of statistics from tracing events and spans.
//!
//! Events with a `stats` field contribute their other fields: integers are accumulated per
//! field name, everything else keeps its last value. Spans with a `timing` field record
//! their duration as the integer `time_<name>_ms`.
use std::{
    collections::BTreeMap,
    convert::TryFrom,
    fs::File,
    sync::{Arc, Mutex},
    time::Instant,
};
use tracing::field::{Field, Visit};
use tracing::Subscriber;
use tracing_subscriber::Layer;
use tracing_subscriber::{layer::Context, registry::LookupSpan};

/// Running summary of the values of an integer field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Accumulator {
    first: i128,
    last: i128,
    min: i128,
    max: i128,
    sum: i128,
    count: u64,
}

impl Accumulator {
    fn new(value: i128) -> Self {
        Accumulator {
            first: value,
            last: value,
            min: value,
            max: value,
            sum: value,
            count: 1,
        }
    }

    fn add(&mut self, value: i128) {
        self.last = value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.sum += value;
        self.count += 1;
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Stat {
    Integer(Accumulator),
    Other(serde_json::Value),
}

/// Recorded statistics, flattened to `<field>_<first|last|min|max|sum|count>` for integers
#[derive(Debug, Default)]
struct Stats(BTreeMap<String, Stat>);

impl Stats {
    fn record_int(&mut self, name: &str, value: i128) {
        match self.0.get_mut(name) {
            Some(Stat::Integer(acc)) => acc.add(value),
            _ => {
                self.0
                    .insert(name.to_owned(), Stat::Integer(Accumulator::new(value)));
            }
        }
    }

    fn record(&mut self, name: &str, value: serde_json::Value) {
        self.0.insert(name.to_owned(), Stat::Other(value));
    }

    fn to_json(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut res = serde_json::Map::new();
        for (name, stat) in self.0.iter() {
            match stat {
                Stat::Other(value) => {
                    res.insert(name.clone(), value.clone());
                }
                Stat::Integer(acc) => {
                    let fields = [
                        ("first", acc.first),
                        ("last", acc.last),
                        ("min", acc.min),
                        ("max", acc.max),
                        ("sum", acc.sum),
                        ("count", acc.count as i128),
                    ];
                    for &(suffix, value) in fields.iter() {
                        res.insert(format!("{}_{}", name, suffix), int_to_json(value));
                    }
                }
            }
        }
        res
    }
}

fn int_to_json(x: i128) -> serde_json::Value {
    if let Ok(small) = i64::try_from(x) {
        small.into()
    } else if let Ok(large) = u64::try_from(x) {
        large.into()
    } else {
        // out of json integer range
        serde_json::Value::String(x.to_string())
    }
}

struct Inner {
    stats: Stats,
    file: File,
}

/// A layer that collects the fields of events which have a `stats` field, and the duration of
/// spans which have a `timing` field.
///
/// Clones share the same statistics.
#[derive(Clone)]
pub struct StatsLayer {
    /// None after dump
    inner: Arc<Mutex<Option<Inner>>>,
}

struct StatsVisitor<'a>(&'a mut Stats);

impl StatsVisitor<'_> {
    fn ignored(field: &Field) -> bool {
        matches!(field.name(), "message" | "stats")
    }
}

impl Visit for StatsVisitor<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if !Self::ignored(field) {
            self.0.record(field.name(), format!("{:?}", value).into())
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        if !Self::ignored(field) {
            self.0.record_int(field.name(), value.into())
        }
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        if !Self::ignored(field) {
            self.0.record_int(field.name(), value.into())
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if !Self::ignored(field) {
            self.0.record(field.name(), value.into())
        }
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        if !Self::ignored(field) {
            self.0.record(field.name(), value.into())
        }
    }
}

impl StatsLayer {
    /// Creates a layer which writes what it collected to `file` when [`StatsLayer::dump`] is
    /// called.
    pub fn new(file: File) -> Self {
        let inner = Inner {
            stats: Stats::default(),
            file,
        };
        Self {
            inner: Arc::new(Mutex::new(Some(inner))),
        }
    }

    fn with_stats(&self, f: impl FnOnce(&mut Stats)) {
        // a panic while holding the lock only loses statistics
        if let Ok(mut guard) = self.inner.lock() {
            if let Some(inner) = guard.as_mut() {
                f(&mut inner.stats)
            }
        }
    }

    /// Writes the statistics as a json object. Does nothing after the first call.
    pub fn dump(&self) {
        let inner = match self.inner.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        if let Some(inner) = inner {
            if let Err(e) = serde_json::to_writer(inner.file, &inner.stats.to_json()) {
                tracing::warn!("failed to write stats: {}", e);
            }
        }
    }
}

struct SpanStart(Instant);

impl<S: Subscriber + for<'a> LookupSpan<'a>> Layer<S> for StatsLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if event.metadata().fields().field("stats").is_none() {
            return;
        }
        self.with_stats(|stats| event.record(&mut StatsVisitor(stats)));
    }

    fn on_new_span(
        &self,
        attrs: &tracing::span::Attributes<'_>,
        id: &tracing::span::Id,
        ctx: Context<'_, S>,
    ) {
        if attrs.metadata().fields().field("timing").is_none() {
            return;
        }
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(SpanStart(Instant::now()))
        }
    }

    fn on_exit(&self, id: &tracing::span::Id, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(id) {
            if let Some(SpanStart(start)) = span.extensions().get() {
                let key = format!("time_{}_ms", span.name());
                let time = start.elapsed().as_millis() as i128;
                self.with_stats(|stats| stats.record_int(&key, time));
            }
        }
    }
}
