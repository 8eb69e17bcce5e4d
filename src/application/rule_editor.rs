use crate::domain::event::AlarmEvent;
use crate::domain::recurrence::{
    EndCondition, Feb29Policy, MonthDay, MonthPos, MonthSet, RecurrenceKind, RecurrenceRule,
    WeekOrdinal, WeekdaySet,
};
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Weekday};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatPeriod {
    None,
    AtLogin,
    SubDaily,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayPosKind {
    Date,
    Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeKind {
    NoEnd,
    Count,
    EndDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditField {
    EndDate,
    EndTime,
    WeekDays,
    Months,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: EditField,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayWeekState {
    pub frequency: u32,
    pub days: WeekdaySet,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthYearState {
    pub frequency: u32,
    pub kind: DayPosKind,
    pub day: MonthDay,
    pub ordinal: WeekOrdinal,
    pub weekday: Weekday,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YearlyState {
    pub months: MonthSet,
    pub feb29: Feb29Policy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeState {
    pub selection: RangeKind,
    pub count: u32,
    pub end_date: NaiveDate,
    pub end_time: NaiveTime,
    pub end_any_time: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SavedSelector {
    None,
    Days(WeekdaySet),
    MonthDate(MonthDay),
    MonthPosition(WeekOrdinal, Weekday),
    YearDate(MonthDay, MonthSet, Feb29Policy),
    YearPosition(WeekOrdinal, Weekday, MonthSet),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SavedState {
    period: RepeatPeriod,
    frequency: u32,
    selector: SavedSelector,
    range_kind: RangeKind,
    count: Option<u32>,
    end: Option<(NaiveDate, NaiveTime, bool)>,
    exceptions: Vec<NaiveDate>,
}

/// Editing model for an event's recurrence definition. Field state mirrors
/// one panel per repeat period, so switching periods never loses what was
/// entered on another panel.
#[derive(Debug, Clone)]
pub struct RuleEditor {
    start: NaiveDateTime,
    default_period: RepeatPeriod,
    default_feb29: Feb29Policy,
    period: RepeatPeriod,
    pub sub_daily_frequency: u32,
    pub daily: DayWeekState,
    pub weekly: DayWeekState,
    pub monthly: MonthYearState,
    pub yearly_rule: MonthYearState,
    pub yearly: YearlyState,
    pub range: RangeState,
    exceptions: Vec<NaiveDate>,
    daily_shown: bool,
    weekly_shown: bool,
    monthly_shown: bool,
    yearly_shown: bool,
    saved: Option<SavedState>,
}

impl RuleEditor {
    pub fn new(start: NaiveDateTime, default_period: RepeatPeriod, default_feb29: Feb29Policy) -> Self {
        let mut editor = Self {
            start,
            default_period,
            default_feb29,
            period: RepeatPeriod::None,
            sub_daily_frequency: 1,
            daily: DayWeekState {
                frequency: 1,
                days: WeekdaySet::all(),
            },
            weekly: DayWeekState {
                frequency: 1,
                days: WeekdaySet::empty(),
            },
            monthly: MonthYearState {
                frequency: 1,
                kind: DayPosKind::Date,
                day: MonthDay::Day(1),
                ordinal: WeekOrdinal::Nth(1),
                weekday: Weekday::Mon,
            },
            yearly_rule: MonthYearState {
                frequency: 1,
                kind: DayPosKind::Date,
                day: MonthDay::Day(1),
                ordinal: WeekOrdinal::Nth(1),
                weekday: Weekday::Mon,
            },
            yearly: YearlyState {
                months: MonthSet::empty(),
                feb29: default_feb29,
            },
            range: RangeState {
                selection: RangeKind::NoEnd,
                count: 1,
                end_date: start.date(),
                end_time: start.time(),
                end_any_time: false,
            },
            exceptions: Vec::new(),
            daily_shown: false,
            weekly_shown: false,
            monthly_shown: false,
            yearly_shown: false,
            saved: None,
        };
        editor.set_defaults(start);
        editor
    }

    pub fn period(&self) -> RepeatPeriod {
        self.period
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn exceptions(&self) -> &[NaiveDate] {
        &self.exceptions
    }

    /// Select the repeat period panel. Marks the panel as having been shown
    /// so later start-date changes stop re-defaulting it.
    pub fn select_period(&mut self, period: RepeatPeriod) {
        self.period = period;
        match period {
            RepeatPeriod::AtLogin => self.range.selection = RangeKind::EndDate,
            RepeatPeriod::Daily => self.daily_shown = true,
            RepeatPeriod::Weekly => self.weekly_shown = true,
            RepeatPeriod::Monthly => self.monthly_shown = true,
            RepeatPeriod::Yearly => self.yearly_shown = true,
            RepeatPeriod::None | RepeatPeriod::SubDaily => {}
        }
    }

    /// Reset every control to its default for the given start date/time.
    pub fn set_defaults(&mut self, from: NaiveDateTime) {
        self.start = from;
        self.range = RangeState {
            selection: RangeKind::NoEnd,
            count: 1,
            end_date: from.date(),
            end_time: from.time(),
            end_any_time: false,
        };
        self.sub_daily_frequency = 1;
        self.daily.frequency = 1;
        self.weekly.frequency = 1;
        self.monthly.frequency = 1;
        self.yearly_rule.frequency = 1;
        self.monthly.kind = DayPosKind::Date;
        self.yearly_rule.kind = DayPosKind::Date;
        self.daily_shown = false;
        self.weekly_shown = false;
        self.monthly_shown = false;
        self.yearly_shown = false;
        self.set_rule_defaults(from.date());
        self.exceptions.clear();
        self.select_period(self.default_period);
        self.save_state();
    }

    /// Default the panels which have not yet been shown from the start date:
    /// the start weekday for weekly rules, the day and week position for
    /// monthly/yearly rules, the start month for yearly rules.
    pub fn set_rule_defaults(&mut self, from: NaiveDate) {
        let day = from.day() as u8;
        let weekday = from.weekday();
        let ordinal = WeekOrdinal::Nth(((from.day() - 1) / 7 + 1) as u8);
        if !self.daily_shown {
            self.daily.days = WeekdaySet::all();
        }
        if !self.weekly_shown {
            self.weekly.days = WeekdaySet::single(weekday);
        }
        if !self.monthly_shown {
            self.monthly.day = MonthDay::Day(day);
            self.monthly.ordinal = ordinal;
            self.monthly.weekday = weekday;
        }
        if !self.yearly_shown {
            self.yearly_rule.day = MonthDay::Day(day);
            self.yearly_rule.ordinal = ordinal;
            self.yearly_rule.weekday = weekday;
            self.yearly.months = MonthSet::single(from.month());
            self.yearly.feb29 = self.default_feb29;
        }
    }

    /// Notify the editor of a change to the alarm start date.
    pub fn set_start_date_time(&mut self, start: NaiveDateTime) {
        self.start = start;
        self.set_rule_defaults(start.date());
    }

    /// Populate all fields from an existing recurrence ("set").
    pub fn populate(&mut self, start: NaiveDateTime, rule: Option<&RecurrenceRule>) {
        self.set_defaults(start);
        self.select_period(RepeatPeriod::None);
        let Some(rule) = rule else {
            self.save_state();
            return;
        };
        match &rule.kind {
            RecurrenceKind::None => {}
            RecurrenceKind::AtLogin => {
                self.select_period(RepeatPeriod::AtLogin);
                if let EndCondition::Until { date, time } = &rule.end {
                    self.range.end_date = *date;
                    match time {
                        Some(time) => {
                            self.range.end_time = *time;
                            self.range.end_any_time = false;
                        }
                        None => self.range.end_any_time = true,
                    }
                }
                self.save_state();
                return;
            }
            RecurrenceKind::Minutely => {
                self.select_period(RepeatPeriod::SubDaily);
                self.sub_daily_frequency = rule.frequency;
            }
            RecurrenceKind::Daily { days } => {
                self.select_period(RepeatPeriod::Daily);
                self.daily.frequency = rule.frequency;
                self.daily.days = if days.is_empty() {
                    WeekdaySet::all()
                } else {
                    *days
                };
            }
            RecurrenceKind::Weekly { days } => {
                self.select_period(RepeatPeriod::Weekly);
                self.weekly.frequency = rule.frequency;
                self.weekly.days = *days;
            }
            RecurrenceKind::MonthlyByPosition { positions } => {
                let every = positions
                    .first()
                    .is_some_and(|position| position.ordinal == WeekOrdinal::Every);
                if every {
                    // Every (Tuesday) of the month: convert to a weekly rule,
                    // ignoring any non-every positions in the same rule.
                    self.select_period(RepeatPeriod::Weekly);
                    self.weekly.frequency = rule.frequency;
                    let mut days = WeekdaySet::empty();
                    for position in positions {
                        if position.ordinal == WeekOrdinal::Every {
                            days.insert(position.weekday);
                        }
                    }
                    self.weekly.days = days;
                } else {
                    self.select_period(RepeatPeriod::Monthly);
                    self.monthly.frequency = rule.frequency;
                    self.monthly.kind = DayPosKind::Position;
                    if let Some(position) = positions.first() {
                        self.monthly.ordinal = position.ordinal;
                        self.monthly.weekday = position.weekday;
                    }
                }
            }
            RecurrenceKind::MonthlyByDate { day } => {
                self.select_period(RepeatPeriod::Monthly);
                self.monthly.frequency = rule.frequency;
                self.monthly.kind = DayPosKind::Date;
                self.monthly.day = *day;
            }
            RecurrenceKind::AnnualByDate { day, months, feb29 } => {
                self.select_period(RepeatPeriod::Yearly);
                self.yearly_rule.frequency = rule.frequency;
                self.yearly_rule.kind = DayPosKind::Date;
                self.yearly_rule.day = *day;
                self.yearly.months = *months;
                self.yearly.feb29 = *feb29;
            }
            RecurrenceKind::AnnualByPosition { positions, months } => {
                self.select_period(RepeatPeriod::Yearly);
                self.yearly_rule.frequency = rule.frequency;
                self.yearly_rule.kind = DayPosKind::Position;
                if let Some(position) = positions.first() {
                    self.yearly_rule.ordinal = position.ordinal;
                    self.yearly_rule.weekday = position.weekday;
                }
                self.yearly.months = *months;
            }
        }

        match &rule.end {
            EndCondition::Indefinite => self.range.selection = RangeKind::NoEnd,
            EndCondition::Count(count) => {
                self.range.selection = RangeKind::Count;
                self.range.count = *count;
            }
            EndCondition::Until { date, time } => {
                self.range.selection = RangeKind::EndDate;
                self.range.end_date = *date;
                match time {
                    Some(time) => {
                        self.range.end_time = *time;
                        self.range.end_any_time = false;
                    }
                    None => self.range.end_any_time = true,
                }
            }
        }

        self.exceptions = rule.exceptions().to_vec();
        self.save_state();
    }

    /// Months which are both ticked and valid for the selected day of month.
    /// Day 30/31 rules disable the months too short for them; day 31 also
    /// disables February.
    pub fn effective_months(&self) -> MonthSet {
        let mut months = self.yearly.months;
        if self.yearly_rule.kind == DayPosKind::Date {
            if let MonthDay::Day(day) = self.yearly_rule.day {
                if day > 29 {
                    months.remove(2);
                }
                if day == 31 {
                    months.remove(4);
                    months.remove(6);
                    months.remove(9);
                    months.remove(11);
                }
            }
        }
        months
    }

    fn feb29_effective(&self) -> Feb29Policy {
        if self.yearly_rule.kind == DayPosKind::Date
            && self.yearly_rule.day == MonthDay::Day(29)
            && self.effective_months().contains(2)
        {
            self.yearly.feb29
        } else {
            Feb29Policy::None
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.period == RepeatPeriod::AtLogin {
            return Ok(());
        }
        if self.range.selection == RangeKind::EndDate {
            let timed = self.period == RepeatPeriod::SubDaily;
            if self.range.end_date < self.start.date() {
                return Err(ValidationError {
                    field: EditField::EndDate,
                    message: if timed {
                        "End date/time is earlier than start date/time".to_string()
                    } else {
                        "End date is earlier than start date".to_string()
                    },
                });
            }
            if timed && self.range.end_date.and_time(self.range.end_time) < self.start {
                return Err(ValidationError {
                    field: EditField::EndTime,
                    message: "End date/time is earlier than start date/time".to_string(),
                });
            }
        }
        match self.period {
            RepeatPeriod::Daily => {
                if self.daily.days.is_empty() {
                    return Err(ValidationError {
                        field: EditField::WeekDays,
                        message: "No day selected".to_string(),
                    });
                }
            }
            RepeatPeriod::Weekly => {
                if self.weekly.days.is_empty() {
                    return Err(ValidationError {
                        field: EditField::WeekDays,
                        message: "No day selected".to_string(),
                    });
                }
            }
            RepeatPeriod::Yearly => {
                if self.effective_months().is_empty() {
                    return Err(ValidationError {
                        field: EditField::Months,
                        message: "No month selected".to_string(),
                    });
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn end_condition(&self, timed: bool) -> EndCondition {
        match self.range.selection {
            RangeKind::NoEnd => EndCondition::Indefinite,
            RangeKind::Count => EndCondition::Count(self.range.count),
            RangeKind::EndDate => EndCondition::Until {
                date: self.range.end_date,
                time: if timed && !self.range.end_any_time {
                    Some(self.range.end_time)
                } else {
                    None
                },
            },
        }
    }

    /// Emit a recurrence rule from the current field state ("commit").
    /// `None` means the alarm does not repeat.
    pub fn commit(&self) -> Option<RecurrenceRule> {
        let mut rule = match self.period {
            RepeatPeriod::None => return None,
            RepeatPeriod::AtLogin => {
                let mut rule = RecurrenceRule::new(RecurrenceKind::AtLogin);
                rule.end = EndCondition::Until {
                    date: self.range.end_date,
                    time: if self.range.end_any_time {
                        None
                    } else {
                        Some(self.range.end_time)
                    },
                };
                return Some(rule);
            }
            RepeatPeriod::SubDaily => {
                let mut rule = RecurrenceRule::new(RecurrenceKind::Minutely);
                rule.frequency = self.sub_daily_frequency;
                rule.end = self.end_condition(true);
                rule
            }
            RepeatPeriod::Daily => {
                let mut rule = RecurrenceRule::new(RecurrenceKind::Daily {
                    days: self.daily.days,
                });
                rule.frequency = self.daily.frequency;
                rule.end = self.end_condition(false);
                rule
            }
            RepeatPeriod::Weekly => {
                let mut rule = RecurrenceRule::new(RecurrenceKind::Weekly {
                    days: self.weekly.days,
                });
                rule.frequency = self.weekly.frequency;
                rule.end = self.end_condition(false);
                rule
            }
            RepeatPeriod::Monthly => {
                let kind = match self.monthly.kind {
                    DayPosKind::Date => RecurrenceKind::MonthlyByDate {
                        day: self.monthly.day,
                    },
                    DayPosKind::Position => RecurrenceKind::MonthlyByPosition {
                        positions: vec![MonthPos {
                            ordinal: self.monthly.ordinal,
                            weekday: self.monthly.weekday,
                        }],
                    },
                };
                let mut rule = RecurrenceRule::new(kind);
                rule.frequency = self.monthly.frequency;
                rule.end = self.end_condition(false);
                rule
            }
            RepeatPeriod::Yearly => {
                let kind = match self.yearly_rule.kind {
                    DayPosKind::Date => RecurrenceKind::AnnualByDate {
                        day: self.yearly_rule.day,
                        months: self.effective_months(),
                        feb29: self.feb29_effective(),
                    },
                    DayPosKind::Position => RecurrenceKind::AnnualByPosition {
                        positions: vec![MonthPos {
                            ordinal: self.yearly_rule.ordinal,
                            weekday: self.yearly_rule.weekday,
                        }],
                        months: self.effective_months(),
                    },
                };
                let mut rule = RecurrenceRule::new(kind);
                rule.frequency = self.yearly_rule.frequency;
                rule.end = self.end_condition(false);
                rule
            }
        };
        rule.set_exceptions(self.exceptions.clone());
        Some(rule)
    }

    /// Write the committed recurrence into the event.
    pub fn update_event(&self, event: &mut AlarmEvent) {
        event.recurrence = self.commit();
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

    pub fn change_exception(&mut self, index: usize, date: NaiveDate) -> bool {
        if index >= self.exceptions.len() || self.exceptions[index] == date {
            return false;
        }
        self.exceptions.remove(index);
        self.add_exception(date);
        true
    }

    pub fn delete_exception(&mut self, index: usize) -> bool {
        if index >= self.exceptions.len() {
            return false;
        }
        self.exceptions.remove(index);
        true
    }

    fn capture_state(&self) -> SavedState {
        let (frequency, selector) = match self.period {
            RepeatPeriod::None | RepeatPeriod::AtLogin => (0, SavedSelector::None),
            RepeatPeriod::SubDaily => (self.sub_daily_frequency, SavedSelector::None),
            RepeatPeriod::Daily => (self.daily.frequency, SavedSelector::Days(self.daily.days)),
            RepeatPeriod::Weekly => (self.weekly.frequency, SavedSelector::Days(self.weekly.days)),
            RepeatPeriod::Monthly => (
                self.monthly.frequency,
                match self.monthly.kind {
                    DayPosKind::Date => SavedSelector::MonthDate(self.monthly.day),
                    DayPosKind::Position => {
                        SavedSelector::MonthPosition(self.monthly.ordinal, self.monthly.weekday)
                    }
                },
            ),
            RepeatPeriod::Yearly => (
                self.yearly_rule.frequency,
                match self.yearly_rule.kind {
                    DayPosKind::Date => SavedSelector::YearDate(
                        self.yearly_rule.day,
                        self.yearly.months,
                        self.feb29_effective(),
                    ),
                    DayPosKind::Position => SavedSelector::YearPosition(
                        self.yearly_rule.ordinal,
                        self.yearly_rule.weekday,
                        self.yearly.months,
                    ),
                },
            ),
        };
        SavedState {
            period: self.period,
            frequency,
            selector,
            range_kind: self.range.selection,
            count: (self.range.selection == RangeKind::Count).then_some(self.range.count),
            end: (self.range.selection == RangeKind::EndDate).then_some((
                self.range.end_date,
                self.range.end_time,
                self.range.end_any_time,
            )),
            exceptions: self.exceptions.clone(),
        }
    }

    /// Checkpoint the current field state.
    pub fn save_state(&mut self) {
        self.saved = Some(self.capture_state());
    }

    /// Whether any field differs from the last checkpoint.
    pub fn state_changed(&self) -> bool {
        match &self.saved {
            Some(saved) => *saved != self.capture_state(),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn datetime(value: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S").expect("valid datetime")
    }

    fn date(value: &str) -> NaiveDate {
        value.parse().expect("valid date")
    }

    fn editor() -> RuleEditor {
        // 2024-03-15 is a Friday.
        RuleEditor::new(
            datetime("2024-03-15T09:00:00"),
            RepeatPeriod::None,
            Feb29Policy::None,
        )
    }

    #[test]
    fn weekly_defaults_to_start_weekday() {
        let mut editor = editor();
        editor.select_period(RepeatPeriod::Weekly);
        editor.weekly.frequency = 2;
        editor.range.selection = RangeKind::Count;
        editor.range.count = 5;
        let rule = editor.commit().expect("rule");
        assert_eq!(rule.frequency, 2);
        assert_eq!(rule.end, EndCondition::Count(5));
        assert_eq!(
            rule.kind,
            RecurrenceKind::Weekly {
                days: WeekdaySet::single(Weekday::Fri),
            }
        );
    }

    #[test]
    fn monthly_defaults_to_day_and_week_position_of_start() {
        let editor = editor();
        assert_eq!(editor.monthly.day, MonthDay::Day(15));
        assert_eq!(editor.monthly.ordinal, WeekOrdinal::Nth(3));
        assert_eq!(editor.monthly.weekday, Weekday::Fri);
        assert!(editor.yearly.months.contains(3));
    }

    #[test]
    fn shown_panels_keep_their_state_across_start_changes() {
        let mut editor = editor();
        editor.select_period(RepeatPeriod::Weekly);
        editor.weekly.days = WeekdaySet::single(Weekday::Mon);
        editor.set_start_date_time(datetime("2024-04-03T09:00:00"));
        // Weekly was shown, so it keeps Monday; monthly was not, so it
        // follows the new start date.
        assert_eq!(editor.weekly.days, WeekdaySet::single(Weekday::Mon));
        assert_eq!(editor.monthly.day, MonthDay::Day(3));
    }

    #[test]
    fn populate_and_commit_round_trip_each_type() {
        let start = datetime("2024-03-15T09:00:00");
        let rules = vec![
            {
                let mut rule = RecurrenceRule::new(RecurrenceKind::Minutely);
                rule.frequency = 45;
                rule.end = EndCondition::Until {
                    date: date("2024-03-20"),
                    time: NaiveTime::from_hms_opt(18, 0, 0),
                };
                rule
            },
            {
                let mut rule = RecurrenceRule::new(RecurrenceKind::Daily {
                    days: WeekdaySet::all(),
                });
                rule.frequency = 3;
                rule.set_exceptions(vec![date("2024-03-18"), date("2024-03-25")]);
                rule
            },
            {
                let mut rule = RecurrenceRule::new(RecurrenceKind::Weekly {
                    days: WeekdaySet::single(Weekday::Wed),
                });
                rule.frequency = 2;
                rule.end = EndCondition::Count(8);
                rule
            },
            RecurrenceRule::new(RecurrenceKind::MonthlyByDate {
                day: MonthDay::Last,
            }),
            RecurrenceRule::new(RecurrenceKind::MonthlyByPosition {
                positions: vec![MonthPos {
                    ordinal: WeekOrdinal::NthLast(2),
                    weekday: Weekday::Tue,
                }],
            }),
            {
                let mut rule = RecurrenceRule::new(RecurrenceKind::AnnualByDate {
                    day: MonthDay::Day(29),
                    months: MonthSet::single(2),
                    feb29: Feb29Policy::Feb28,
                });
                rule.frequency = 1;
                rule
            },
            RecurrenceRule::new(RecurrenceKind::AnnualByPosition {
                positions: vec![MonthPos {
                    ordinal: WeekOrdinal::Nth(1),
                    weekday: Weekday::Mon,
                }],
                months: {
                    let mut months = MonthSet::single(3);
                    months.insert(9);
                    months
                },
            }),
        ];

        for rule in rules {
            let mut editor = editor();
            editor.populate(start, Some(&rule));
            assert!(!editor.state_changed());
            let committed = editor.commit().expect("rule");
            assert_eq!(committed, rule);
        }
    }

    #[test]
    fn populate_none_commits_none() {
        let mut editor = editor();
        editor.populate(datetime("2024-03-15T09:00:00"), None);
        assert!(editor.commit().is_none());
    }

    #[test]
    fn every_weekday_position_normalises_to_weekly() {
        let mut rule = RecurrenceRule::new(RecurrenceKind::MonthlyByPosition {
            positions: vec![
                MonthPos {
                    ordinal: WeekOrdinal::Every,
                    weekday: Weekday::Wed,
                },
                MonthPos {
                    ordinal: WeekOrdinal::Nth(2),
                    weekday: Weekday::Fri,
                },
            ],
        });
        rule.frequency = 2;
        let mut editor = editor();
        editor.populate(datetime("2024-03-15T09:00:00"), Some(&rule));
        assert_eq!(editor.period(), RepeatPeriod::Weekly);
        assert_eq!(editor.weekly.frequency, 2);
        // The non-every Friday entry is discarded.
        assert_eq!(editor.weekly.days, WeekdaySet::single(Weekday::Wed));
        let committed = editor.commit().expect("rule");
        assert_eq!(
            committed.kind,
            RecurrenceKind::Weekly {
                days: WeekdaySet::single(Weekday::Wed),
            }
        );
        assert_eq!(committed.frequency, 2);
    }

    #[test]
    fn weekly_requires_at_least_one_day() {
        let mut editor = editor();
        editor.select_period(RepeatPeriod::Weekly);
        editor.weekly.days = WeekdaySet::empty();
        let error = editor.validate().expect_err("invalid");
        assert_eq!(error.field, EditField::WeekDays);

        editor.weekly.days = WeekdaySet::single(Weekday::Tue);
        assert!(editor.validate().is_ok());
    }

    #[test]
    fn end_date_must_not_precede_start() {
        let mut editor = editor();
        editor.select_period(RepeatPeriod::Daily);
        editor.range.selection = RangeKind::EndDate;
        editor.range.end_date = date("2024-03-14");
        let error = editor.validate().expect_err("invalid");
        assert_eq!(error.field, EditField::EndDate);

        editor.range.end_date = date("2024-03-15");
        assert!(editor.validate().is_ok());
    }

    #[test]
    fn sub_daily_end_time_is_compared_with_time() {
        let mut editor = editor();
        editor.select_period(RepeatPeriod::SubDaily);
        editor.range.selection = RangeKind::EndDate;
        editor.range.end_date = date("2024-03-15");
        editor.range.end_time = NaiveTime::from_hms_opt(8, 0, 0).expect("valid time");
        let error = editor.validate().expect_err("invalid");
        assert_eq!(error.field, EditField::EndTime);
    }

    #[test]
    fn day31_disables_short_months() {
        let mut editor = editor();
        editor.select_period(RepeatPeriod::Yearly);
        editor.yearly_rule.day = MonthDay::Day(31);
        editor.yearly.months = MonthSet::empty();
        editor.yearly.months.insert(4);
        editor.yearly.months.insert(6);
        let error = editor.validate().expect_err("invalid");
        assert_eq!(error.field, EditField::Months);

        editor.yearly.months.insert(1);
        assert!(editor.validate().is_ok());
        let committed = editor.commit().expect("rule");
        assert_eq!(
            committed.kind,
            RecurrenceKind::AnnualByDate {
                day: MonthDay::Day(31),
                months: MonthSet::single(1),
                feb29: Feb29Policy::None,
            }
        );
    }

    #[test]
    fn feb29_policy_only_applies_when_feb29_selected() {
        let mut editor = editor();
        editor.select_period(RepeatPeriod::Yearly);
        editor.yearly_rule.day = MonthDay::Day(15);
        editor.yearly.feb29 = Feb29Policy::Mar1;
        let committed = editor.commit().expect("rule");
        match committed.kind {
            RecurrenceKind::AnnualByDate { feb29, .. } => assert_eq!(feb29, Feb29Policy::None),
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn state_changed_tracks_every_field_group() {
        let mut editor = editor();
        editor.select_period(RepeatPeriod::Weekly);
        editor.save_state();
        assert!(!editor.state_changed());

        editor.weekly.frequency = 4;
        assert!(editor.state_changed());
        editor.save_state();

        editor.weekly.days = WeekdaySet::single(Weekday::Mon);
        assert!(editor.state_changed());
        editor.save_state();

        editor.range.selection = RangeKind::Count;
        editor.range.count = 3;
        assert!(editor.state_changed());
        editor.save_state();

        editor.add_exception(date("2024-04-01"));
        assert!(editor.state_changed());
        editor.save_state();
        assert!(!editor.state_changed());
    }

    #[test]
    fn exception_edits_keep_the_list_ordered() {
        let mut editor = editor();
        assert!(editor.add_exception(date("2024-03-20")));
        assert!(editor.add_exception(date("2024-03-18")));
        assert!(!editor.add_exception(date("2024-03-18")));
        assert_eq!(
            editor.exceptions(),
            &[date("2024-03-18"), date("2024-03-20")]
        );
        assert!(editor.change_exception(0, date("2024-03-22")));
        assert_eq!(
            editor.exceptions(),
            &[date("2024-03-20"), date("2024-03-22")]
        );
        assert!(editor.delete_exception(1));
        assert_eq!(editor.exceptions(), &[date("2024-03-20")]);
        assert!(!editor.delete_exception(5));
    }
}
