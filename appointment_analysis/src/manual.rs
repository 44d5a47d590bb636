/*!

This is the long-form manual for `appointment_analysis` and `apptrend`.

## What the pipeline computes

`apptrend` ingests appointment registers covering several years, decides
which rows are *reappointments* (the same person returning to the same
position in the same organization), and answers one question: is the
government-wide reappointment proportion trending up or down?

The stages run strictly in order, each consuming the previous one's output:

1. every name, position and organization value is normalized (lowercased,
   whitespace-collapsed, stripped of `.,;:!?`);
2. rows with all three normalized fields present get a composite identity
   key; rows with a hole in their identity are kept but never matched;
3. within each identity group, the chronologically earliest row is the
   founding appointment and every later row is flagged as a reappointment;
4. flagged rows are aggregated into organization-year cells and yearly
   government-wide summaries;
5. for each year, the organization with the highest reappointment rate is
   selected under a deterministic tie-break (larger sample first, then more
   reappointments, then the lexicographically smallest organization);
6. an ordinary least-squares regression of the yearly proportion against
   the year yields the trend direction, its significance, and residual
   diagnostics (Durbin-Watson, Jarque-Bera, standardized outliers).

## Input formats

The following source providers are supported:
* `csv` Comma separated values with a header row
* `excel` Excel (`.xlsx`) workbooks, first worksheet by default

### `csv`

One appointment per row. Column names are matched case-insensitively
against the configured column map; the default map expects `name`,
`position`, `org`, `year` and optionally `reappointed`.

```text
name,position,org,year,reappointed
Jane Doe,Director,Health Dept,2015,false
jane   doe,DIRECTOR,Health Dept.,2018,
```

A missing `year` column is acceptable when the source file carries a
`yearOverride` in the configuration (common for registers published as one
file per year).

### `excel`

The same row layout, read from the first worksheet unless `worksheetName`
says otherwise. Numeric year cells are accepted in integer or float
notation, since spreadsheet exports routinely turn `2015` into `2015.0`.

## Configuration

`apptrend` comes with sensible defaults but accepts a configuration file in
JSON for multi-file runs and policy options:

```json
{
  "outputSettings": {
    "analysisName": "appointments 2013-2024",
    "outputDirectory": "out",
    "yearRangeStart": 2013,
    "yearRangeEnd": 2024
  },
  "sourceFiles": [
    { "provider": "csv", "filePath": "appointments_2013.csv", "yearOverride": 2013 },
    { "provider": "excel", "filePath": "appointments_2014.xlsx", "yearOverride": 2014 }
  ],
  "columns": { "name": "name", "position": "position", "organization": "org", "year": "year" },
  "rules": { "foldHonorifics": false, "minOrganizationCount": 1 }
}
```

Notes on the options:

- `foldHonorifics` (default false): strip a leading `Mr`/`Mrs`/`Ms`/`Dr`/
  `Hon`/`Prof` from names before matching. This changes the
  precision/recall trade-off of the matcher and is therefore never applied
  silently.
- `minOrganizationCount` (default 1): minimum appointments an organization
  needs in a year before it can be that year's reappointment-rate leader.
  A value such as 5 suppresses small-sample noise.
- `yearRangeStart`/`yearRangeEnd` (default 2013/2024): the years the annual
  summaries cover. Rows dated outside this range are excluded from the
  aggregation and reported as data-quality gaps.

## Outputs

Four tables and a summary are written to the output directory:

| file | contents |
|------|----------|
| `appointments_flagged.csv` | every input row plus the recomputed flag and the flag the source reported |
| `org_year_rates.csv` | one row per organization and year with counts and rate |
| `annual_summary.csv` | one row per year of the configured range, including empty years |
| `yearly_max.csv` | the top organization per year under the documented tie-break |
| `trend_summary.json` | the regression record and the yearly leaders |

With `--reference`, the produced `trend_summary.json` is compared against a
previously saved summary and the run fails on any difference, which makes
pipeline changes reviewable the same way election tabulators compare
against certified results.

## Data quality

Rows with a missing name, position or organization can never be matched, so
they are counted in the totals but never flagged as reappointments — a
deliberate precision-over-recall choice: an undecidable row defaults to
"not a reappointment" rather than guessing. Rows without a usable year
order last within their identity group and are excluded from the yearly
tables. None of these gaps abort a run; they are counted and reported.

 */
