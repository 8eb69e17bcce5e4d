use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use std::collections::VecDeque;

const MAX_EMPTY_PERIODS: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Feb29Policy {
    #[default]
    None,
    Mar1,
    Feb28,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn all() -> Self {
        Self(0b0111_1111)
    }

    pub fn single(day: Weekday) -> Self {
        let mut set = Self::empty();
        set.insert(day);
        set
    }

    pub fn insert(&mut self, day: Weekday) {
        self.0 |= 1 << day.num_days_from_monday();
    }

    pub fn remove(&mut self, day: Weekday) {
        self.0 &= !(1 << day.num_days_from_monday());
    }

    pub fn contains(self, day: Weekday) -> bool {
        self.0 & (1 << day.num_days_from_monday()) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Days in Monday-first order.
    pub fn iter(self) -> impl Iterator<Item = Weekday> {
        WEEKDAYS_MONDAY_FIRST
            .iter()
            .copied()
            .filter(move |day| self.contains(*day))
    }
}

pub const WEEKDAYS_MONDAY_FIRST: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MonthSet(u16);

impl MonthSet {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn single(month: u32) -> Self {
        let mut set = Self::empty();
        set.insert(month);
        set
    }

    pub fn insert(&mut self, month: u32) {
        if (1..=12).contains(&month) {
            self.0 |= 1 << (month - 1);
        }
    }

    pub fn remove(&mut self, month: u32) {
        if (1..=12).contains(&month) {
            self.0 &= !(1 << (month - 1));
        }
    }

    pub fn contains(self, month: u32) -> bool {
        (1..=12).contains(&month) && self.0 & (1 << (month - 1)) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = u32> {
        (1..=12u32).filter(move |month| self.contains(*month))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonthDay {
    Day(u8),
    Last,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeekOrdinal {
    Nth(u8),
    NthLast(u8),
    Every,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthPos {
    pub ordinal: WeekOrdinal,
    pub weekday: Weekday,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndCondition {
    Indefinite,
    Count(u32),
    Until {
        date: NaiveDate,
        time: Option<NaiveTime>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecurrenceKind {
    None,
    AtLogin,
    Minutely,
    Daily { days: WeekdaySet },
    Weekly { days: WeekdaySet },
    MonthlyByDate { day: MonthDay },
    MonthlyByPosition { positions: Vec<MonthPos> },
    AnnualByDate {
        day: MonthDay,
        months: MonthSet,
        feb29: Feb29Policy,
    },
    AnnualByPosition {
        positions: Vec<MonthPos>,
        months: MonthSet,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurrenceRule {
    pub kind: RecurrenceKind,
    pub frequency: u32,
    pub end: EndCondition,
    exceptions: Vec<NaiveDate>,
}

impl RecurrenceRule {
    pub fn new(kind: RecurrenceKind) -> Self {
        Self {
            kind,
            frequency: 1,
            end: EndCondition::Indefinite,
            exceptions: Vec::new(),
        }
    }

    pub fn is_recurring(&self) -> bool {
        !matches!(self.kind, RecurrenceKind::None | RecurrenceKind::AtLogin)
    }

    pub fn exceptions(&self) -> &[NaiveDate] {
        &self.exceptions
    }

    pub fn set_exceptions(&mut self, mut dates: Vec<NaiveDate>) {
        dates.sort();
        dates.dedup();
        self.exceptions = dates;
    }

    pub fn add_exception(&mut self, date: NaiveDate) -> bool {
        match self.exceptions.binary_search(&date) {
            Ok(_) => false,
            Err(index) => {
                self.exceptions.insert(index, date);
                true
            }
        }
    }

    pub fn remove_exception(&mut self, date: NaiveDate) -> bool {
        match self.exceptions.binary_search(&date) {
            Ok(index) => {
                self.exceptions.remove(index);
                true
            }
            Err(_) => false,
        }
    }

    pub fn occurrences(&self, start: NaiveDateTime) -> Occurrences<'_> {
        Occurrences::new(self, start, 0)
    }

    /// First occurrence at or after `after`, honouring the end condition and
    /// the exception-date list.
    pub fn next_on_or_after(
        &self,
        start: NaiveDateTime,
        after: NaiveDateTime,
    ) -> Option<NaiveDateTime> {
        let initial_period = if matches!(self.end, EndCondition::Count(_)) {
            // Counted rules must be walked from the first occurrence.
            0
        } else {
            self.period_hint(start, after)
        };
        Occurrences::new(self, start, initial_period).find(|occurrence| *occurrence >= after)
    }

    fn period_hint(&self, start: NaiveDateTime, after: NaiveDateTime) -> u32 {
        if after <= start {
            return 0;
        }
        let frequency = i64::from(self.frequency.max(1));
        let elapsed = after - start;
        let periods = match &self.kind {
            RecurrenceKind::None | RecurrenceKind::AtLogin => 0,
            RecurrenceKind::Minutely => elapsed.num_minutes() / frequency,
            RecurrenceKind::Daily { .. } => elapsed.num_days() / frequency,
            RecurrenceKind::Weekly { .. } => elapsed.num_days() / (7 * frequency),
            RecurrenceKind::MonthlyByDate { .. } | RecurrenceKind::MonthlyByPosition { .. } => {
                elapsed.num_days() / (31 * frequency)
            }
            RecurrenceKind::AnnualByDate { .. } | RecurrenceKind::AnnualByPosition { .. } => {
                elapsed.num_days() / (366 * frequency)
            }
        };
        // Back off one period so boundary occurrences are not skipped.
        periods.saturating_sub(1).clamp(0, i64::from(u32::MAX)) as u32
    }
}

pub struct Occurrences<'a> {
    rule: &'a RecurrenceRule,
    start: NaiveDateTime,
    period: u32,
    buffer: VecDeque<NaiveDateTime>,
    generated: u32,
    empty_periods: u32,
    done: bool,
}

impl<'a> Occurrences<'a> {
    fn new(rule: &'a RecurrenceRule, start: NaiveDateTime, initial_period: u32) -> Self {
        Self {
            rule,
            start,
            period: initial_period,
            buffer: VecDeque::new(),
            generated: 0,
            empty_periods: 0,
            done: false,
        }
    }

    fn past_until(&self, occurrence: NaiveDateTime) -> bool {
        match &self.rule.end {
            EndCondition::Until { date, time } => match time {
                Some(time) => occurrence > date.and_time(*time),
                None => occurrence.date() > *date,
            },
            _ => false,
        }
    }

    fn fill_period(&mut self) {
        let frequency = self.rule.frequency.max(1);
        let k = self.period;
        match &self.rule.kind {
            RecurrenceKind::None | RecurrenceKind::AtLogin => {
                if k == 0 {
                    self.buffer.push_back(self.start);
                } else {
                    self.done = true;
                }
            }
            RecurrenceKind::Minutely => {
                let minutes = i64::from(k) * i64::from(frequency);
                if let Some(occurrence) = self
                    .start
                    .checked_add_signed(Duration::minutes(minutes))
                {
                    self.buffer.push_back(occurrence);
                } else {
                    self.done = true;
                }
            }
            RecurrenceKind::Daily { days } => {
                let offset = i64::from(k) * i64::from(frequency);
                match self
                    .start
                    .date()
                    .checked_add_signed(Duration::days(offset))
                {
                    Some(date) => {
                        if days.is_empty() || days.contains(date.weekday()) {
                            self.buffer.push_back(date.and_time(self.start.time()));
                        }
                    }
                    None => self.done = true,
                }
            }
            RecurrenceKind::Weekly { days } => {
                let week_anchor = self.start.date()
                    - Duration::days(i64::from(self.start.weekday().num_days_from_monday()));
                let offset = i64::from(k) * i64::from(frequency) * 7;
                match week_anchor.checked_add_signed(Duration::days(offset)) {
                    Some(week_start) => {
                        for day in days.iter() {
                            let date =
                                week_start + Duration::days(i64::from(day.num_days_from_monday()));
                            if date >= self.start.date() {
                                self.buffer.push_back(date.and_time(self.start.time()));
                            }
                        }
                    }
                    None => self.done = true,
                }
            }
            RecurrenceKind::MonthlyByDate { day } => {
                match step_months(self.start.date(), k, frequency) {
                    Some((year, month)) => {
                        if let Some(date) = resolve_month_day(year, month, *day, Feb29Policy::None)
                        {
                            if date >= self.start.date() {
                                self.buffer.push_back(date.and_time(self.start.time()));
                            }
                        }
                    }
                    None => self.done = true,
                }
            }
            RecurrenceKind::MonthlyByPosition { positions } => {
                match step_months(self.start.date(), k, frequency) {
                    Some((year, month)) => {
                        let mut dates = resolve_positions(year, month, positions);
                        dates.retain(|date| *date >= self.start.date());
                        for date in dates {
                            self.buffer.push_back(date.and_time(self.start.time()));
                        }
                    }
                    None => self.done = true,
                }
            }
            RecurrenceKind::AnnualByDate { day, months, feb29 } => {
                match step_years(self.start.date(), k, frequency) {
                    Some(year) => {
                        let mut dates: Vec<NaiveDate> = months
                            .iter()
                            .filter_map(|month| resolve_month_day(year, month, *day, *feb29))
                            .filter(|date| *date >= self.start.date())
                            .collect();
                        dates.sort();
                        dates.dedup();
                        for date in dates {
                            self.buffer.push_back(date.and_time(self.start.time()));
                        }
                    }
                    None => self.done = true,
                }
            }
            RecurrenceKind::AnnualByPosition { positions, months } => {
                match step_years(self.start.date(), k, frequency) {
                    Some(year) => {
                        let mut dates: Vec<NaiveDate> = months
                            .iter()
                            .flat_map(|month| resolve_positions(year, month, positions))
                            .filter(|date| *date >= self.start.date())
                            .collect();
                        dates.sort();
                        dates.dedup();
                        for date in dates {
                            self.buffer.push_back(date.and_time(self.start.time()));
                        }
                    }
                    None => self.done = true,
                }
            }
        }
        self.period += 1;
    }
}

impl Iterator for Occurrences<'_> {
    type Item = NaiveDateTime;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }
            if let Some(occurrence) = self.buffer.pop_front() {
                self.empty_periods = 0;
                if self.past_until(occurrence) {
                    self.done = true;
                    return None;
                }
                self.generated += 1;
                if let EndCondition::Count(count) = self.rule.end {
                    if self.generated > count {
                        self.done = true;
                        return None;
                    }
                }
                if self
                    .rule
                    .exceptions
                    .binary_search(&occurrence.date())
                    .is_ok()
                {
                    continue;
                }
                return Some(occurrence);
            }
            self.empty_periods += 1;
            if self.empty_periods > MAX_EMPTY_PERIODS {
                self.done = true;
                return None;
            }
            self.fill_period();
        }
    }
}

fn step_months(start: NaiveDate, period: u32, frequency: u32) -> Option<(i32, u32)> {
    let base = i64::from(start.year()) * 12 + i64::from(start.month0());
    let index = base.checked_add(i64::from(period).checked_mul(i64::from(frequency))?)?;
    let year = i32::try_from(index.div_euclid(12)).ok()?;
    let month = (index.rem_euclid(12) + 1) as u32;
    Some((year, month))
}

fn step_years(start: NaiveDate, period: u32, frequency: u32) -> Option<i32> {
    let offset = i64::from(period).checked_mul(i64::from(frequency))?;
    i32::try_from(i64::from(start.year()).checked_add(offset)?).ok()
}

fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1).and_then(|first| first.pred_opt())
}

fn resolve_month_day(
    year: i32,
    month: u32,
    day: MonthDay,
    feb29: Feb29Policy,
) -> Option<NaiveDate> {
    match day {
        MonthDay::Last => last_day_of_month(year, month),
        MonthDay::Day(day) => {
            if let Some(date) = NaiveDate::from_ymd_opt(year, month, u32::from(day)) {
                return Some(date);
            }
            if month == 2 && day == 29 {
                // February 29th in a non-leap year: apply the configured policy.
                return match feb29 {
                    Feb29Policy::None => None,
                    Feb29Policy::Mar1 => NaiveDate::from_ymd_opt(year, 3, 1),
                    Feb29Policy::Feb28 => NaiveDate::from_ymd_opt(year, 2, 28),
                };
            }
            None
        }
    }
}

fn resolve_positions(year: i32, month: u32, positions: &[MonthPos]) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    for position in positions {
        let matching: Vec<NaiveDate> = days_of_month(year, month)
            .filter(|date| date.weekday() == position.weekday)
            .collect();
        match position.ordinal {
            WeekOrdinal::Nth(n) => {
                if let Some(date) = matching.get(usize::from(n).saturating_sub(1)) {
                    dates.push(*date);
                }
            }
            WeekOrdinal::NthLast(n) => {
                let n = usize::from(n);
                if n >= 1 && n <= matching.len() {
                    dates.push(matching[matching.len() - n]);
                }
            }
            WeekOrdinal::Every => dates.extend(matching),
        }
    }
    dates.sort();
    dates.dedup();
    dates
}

fn days_of_month(year: i32, month: u32) -> impl Iterator<Item = NaiveDate> {
    (1..=31u32).filter_map(move |day| NaiveDate::from_ymd_opt(year, month, day))
}
